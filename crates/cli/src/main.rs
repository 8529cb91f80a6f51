fn main() {
    if let Err(e) = assetkeep_cli::run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
