/// Convert a byte count to a human-readable string with base-1024 units.
pub fn format_bytes(size: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB", "EB"];

    if size == 0 {
        return "0.0 B".to_string();
    }

    let exponent = ((size as f64).log2() / 10.0).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let value = size as f64 / 1024f64.powi(exponent as i32);
    format!("{:.1} {}", value, UNITS[exponent])
}
