use std::path::Path;

use renamer_media::{check_ffmpeg, check_ffprobe};
use renamer_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Fails when BOT_TOKEN is missing
    let config = WorkerConfig::from_env()?;

    println!(
        "renamer-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;

    let ffmpeg = check_ffmpeg().map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;
    let ffprobe = check_ffprobe().map_err(|e| anyhow::anyhow!("ffprobe not available: {}", e))?;
    println!("renamer-selfcheck: ffmpeg={} ffprobe={}", ffmpeg.display(), ffprobe.display());

    if config.redis_url.is_none() {
        println!("renamer-selfcheck: REDIS_URL not set, preferences will not persist");
    }

    println!("renamer-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;

    // The worker writes downloads and outputs here
    let probe = path.join(".selfcheck");
    tokio::fs::write(&probe, b"ok").await?;
    tokio::fs::remove_file(&probe).await?;
    Ok(())
}
