fn main() {
    let code = mpb_cli::run_from_env();
    std::process::exit(code);
}
