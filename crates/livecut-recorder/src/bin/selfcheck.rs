use std::path::Path;

use livecut_media::{check_ffmpeg, check_ffprobe};
use livecut_recorder::config::config_path;
use livecut_recorder::RecorderConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let path = config_path(std::env::args().nth(1));
    println!("livecut-selfcheck: config {}", path.display());
    let config = RecorderConfig::load(&path)
        .await
        .map_err(|e| anyhow::anyhow!("config invalid: {}", e))?;
    println!("livecut-selfcheck: {} rooms configured", config.rooms.len());

    ensure_writable(&config.root.data_path.join("data")).await?;

    let ffmpeg = check_ffmpeg().map_err(|e| anyhow::anyhow!("{}", e))?;
    let ffprobe = check_ffprobe().map_err(|e| anyhow::anyhow!("{}", e))?;
    println!(
        "livecut-selfcheck: ffmpeg={} ffprobe={}",
        ffmpeg.display(),
        ffprobe.display()
    );

    if config.root.uploader.command.is_none()
        && config.rooms.iter().any(|r| r.uploader.uploads_anything())
    {
        println!("livecut-selfcheck: warning: uploads requested but no uploader command configured");
    }

    println!("livecut-selfcheck: ok");
    Ok(())
}

async fn ensure_writable(dir: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| anyhow::anyhow!("cannot create {}: {}", dir.display(), e))?;
    let probe = dir.join(".livecut-selfcheck");
    tokio::fs::write(&probe, b"ok")
        .await
        .map_err(|e| anyhow::anyhow!("{} is not writable: {}", dir.display(), e))?;
    tokio::fs::remove_file(&probe).await?;
    Ok(())
}
