#[tokio::main]
async fn main() -> anyhow::Result<()> {
    switch_bench_lib::run().await
}
