#[actix_web::main]
async fn main() -> std::io::Result<()> {
    product_catalog::run().await
}
