use lookbook_core::config::EmbeddingConfig;
use lookbook_embed::get_default_embedder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let text = std::env::args().nth(1).unwrap_or_else(|| "black top with polka dot pattern".to_string());
    let embedder = get_default_embedder(&EmbeddingConfig::default())?;
    let v = embedder.embed_text(&text).await?;
    println!("model={} dim={} head={:?}", v.model, v.dim(), &v.values[..8.min(v.dim())]);
    Ok(())
}
