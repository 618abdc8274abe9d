#[tokio::main]
async fn main() {
    if let Err(e) = protocare_lib::run().await {
        eprintln!("protocare: {e}");
        std::process::exit(1);
    }
}
