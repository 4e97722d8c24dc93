pub mod clock;

use rand::Rng;

/// Characters used for generated subdomain labels.
///
/// Base58 folded to lowercase, so every label is a valid DNS label.
pub const SUBDOMAIN_ALPHABET: &[u8] = b"123456789abcdefghijklmnopqrstuvwxyz";

/// Random token of `len` characters drawn from [`SUBDOMAIN_ALPHABET`].
pub fn random_label(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| SUBDOMAIN_ALPHABET[rng.random_range(0..SUBDOMAIN_ALPHABET.len())] as char)
        .collect()
}

/// Render milliseconds as a duration string truncated to whole seconds.
///
/// `90_500` → `"1m30s"`, `3_600_000` → `"1h0m0s"`, `0` → `"0s"`.
pub fn format_duration(millis: i64) -> String {
    let secs = millis.max(0) / 1000;
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}
