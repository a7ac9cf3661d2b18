use clap::Parser;

fn main() {
    let cli = heattunectl::Cli::parse();
    heattunectl::init_tracing(cli.verbose);
    if let Err(err) = heattunectl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
