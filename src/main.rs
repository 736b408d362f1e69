fn main() {
    if let Err(err) = crm_sync::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
