#[tokio::main]
async fn main() {
    if let Err(e) = veridoc_lib::run().await {
        eprintln!("veridoc: {e}");
        std::process::exit(1);
    }
}
