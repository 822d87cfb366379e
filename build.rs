use std::path::{Path, PathBuf};

const THAI_FONT_URL: &str = "https://github.com/notofonts/notofonts.github.io/raw/main/fonts/NotoSansThai/unhinted/ttf/NotoSansThai-Regular.ttf";

const SYSTEM_THAI_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/noto/NotoSansThai-Regular.ttf",
    "/usr/share/fonts/noto/NotoSansThai-Regular.ttf",
    "/usr/share/fonts/google-noto/NotoSansThai-Regular.ttf",
    "/usr/share/fonts/truetype/tlwg/Loma.ttf",
    "/System/Library/Fonts/Supplemental/Ayuthaya.ttf",
    "C:\\Windows\\Fonts\\LeelawUI.ttf",
];

fn main() -> anyhow::Result<()> {
    println!("cargo::rerun-if-changed=build.rs");
    println!("cargo::rerun-if-changed=fonts");

    let root_dir = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR")?);
    let out_path = PathBuf::from(std::env::var("OUT_DIR")?).join("thai.ttf");
    let font_dir = root_dir.join("fonts");
    let cached = font_dir.join("NotoSansThai-Regular.ttf");

    if cached.exists() {
        std::fs::copy(&cached, &out_path)?;
        return Ok(());
    }
    if let Some(system) = SYSTEM_THAI_FONTS
        .iter()
        .map(Path::new)
        .find(|path| path.exists())
    {
        std::fs::copy(system, &out_path)?;
        return Ok(());
    }

    std::fs::create_dir_all(&font_dir)?;
    match download(THAI_FONT_URL, &cached) {
        Ok(()) => {
            std::fs::copy(&cached, &out_path)?;
        }
        Err(e) => {
            // An empty font makes the app skip the Thai fallback.
            println!("cargo::warning=No Thai font available, Thai labels will not render: {e}");
            std::fs::write(&out_path, [])?;
        }
    }
    Ok(())
}

fn download(url: &str, out_path: &Path) -> anyhow::Result<()> {
    let temp_path = out_path.with_extension("tmp");
    let response = ureq::get(url)
        .call()
        .map_err(|e| anyhow::anyhow!("Failed to download {}: {}", url, e))?;
    if !response.status().is_success() {
        return Err(anyhow::anyhow!(
            "Failed to download {}: HTTP {}",
            url,
            response.status()
        ));
    }
    let mut file = std::fs::File::create(&temp_path)
        .map_err(|e| anyhow::anyhow!("Failed to create file {}: {}", temp_path.display(), e))?;
    std::io::copy(&mut response.into_body().into_reader(), &mut file)
        .map_err(|e| anyhow::anyhow!("Failed to write to file {}: {}", temp_path.display(), e))?;
    drop(file);
    std::fs::rename(&temp_path, out_path)
        .map_err(|e| anyhow::anyhow!("Failed to rename file {}: {}", temp_path.display(), e))?;
    Ok(())
}
