use std::env;

use shoresquad_cache::cli;

fn print_usage() {
    eprintln!("Usage: shorecache [OPTIONS] <COMMAND>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  install             Precache the manifest into the configured version's namespace");
    eprintln!("  activate            Remove every namespace except the configured version's");
    eprintln!("  deploy              install, then activate");
    eprintln!("  fetch <url|path>    Run one request through the gateway (--body prints it)");
    eprintln!("  status              List namespaces in the cache root");
    eprintln!("  serve               deploy, then proxy the origin locally (--memory for no disk)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <PATH>       Config file (default: $XDG_CONFIG_HOME/shoresquad-cache/config.toml)");
    eprintln!("  --cache-version <VER>     Override gateway.version");
    eprintln!("  --origin <URL>            Override gateway.origin");
    eprintln!("  -p, --port <PORT>         Override server.port");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Set RUST_LOG=debug for per-request logging.");
}

#[tokio::main]
async fn main() -> shoresquad_cache::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() || args.iter().any(|a| a == "-h" || a == "--help") {
        print_usage();
        std::process::exit(0);
    }

    match cli::parse_args(&args) {
        Ok(parsed) => cli::run(parsed).await,
        Err(msg) => {
            eprintln!("Error: {msg}");
            eprintln!();
            print_usage();
            std::process::exit(2);
        }
    }
}
