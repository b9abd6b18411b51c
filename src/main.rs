fn main() {
    #[cfg(feature = "cli")]
    firmpatch::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("firmpatch: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
