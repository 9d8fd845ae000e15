use docvault_api_client::{FileResponse, UploadStage};

/// Truncate a string to max_len characters, appending "..." if truncated.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Human-readable byte size.
pub fn format_size(bytes: i64) -> String {
    const KIB: f64 = 1024.0;
    let value = bytes as f64;
    if value < KIB {
        format!("{} B", bytes)
    } else if value < KIB * KIB {
        format!("{:.1} KiB", value / KIB)
    } else {
        format!("{:.1} MiB", value / (KIB * KIB))
    }
}

/// One progress line for an upload stage.
pub fn describe_stage(stage: &UploadStage) -> String {
    match stage {
        UploadStage::Hashing(p) => format!("hashing   {:>3}%", p),
        UploadStage::Uploading(p) => format!("uploading {:>3}%", p),
        UploadStage::Merging => "merging".to_string(),
        UploadStage::Processing => "queued for processing".to_string(),
        UploadStage::Completed => "done".to_string(),
        UploadStage::Error(e) => format!("error: {}", e),
    }
}

/// Files as a fixed-width table.
pub fn render_files_table(files: &[FileResponse]) -> String {
    if files.is_empty() {
        return "No files found.\n".to_string();
    }

    let mut out = format!(
        "{:<36} {:<30} {:<10} {:>4} {:>10} {:<19}\n",
        "ID", "Filename", "Status", "%", "Size", "Created At"
    );
    out.push_str(&"-".repeat(114));
    out.push('\n');

    for file in files {
        out.push_str(&format!(
            "{:<36} {:<30} {:<10} {:>4} {:>10} {:<19}\n",
            file.id,
            truncate_string(&file.filename, 30),
            file.status.to_string(),
            file.progress,
            file.size_bytes.map(format_size).unwrap_or_else(|| "-".to_string()),
            file.created_at.format("%Y-%m-%d %H:%M:%S")
        ));
        if let Some(ref error) = file.error_message {
            out.push_str(&format!("    error: {}\n", error));
        }
    }
    out
}

/// Initialize tracing for the CLI. Quiet unless RUST_LOG asks for more.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();
}
