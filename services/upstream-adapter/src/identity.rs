use sha1::{Digest, Sha1};

/// Stable identity for an upstream source (§4.8): `_` followed by the first
/// 10 hex digits of the SHA-1 of the URL and source device concatenated.
pub fn adapter_identity(url: &str, source_device: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(url.as_bytes());
    hasher.update(source_device.as_bytes());
    let digest = hasher.finalize();
    format!("_{}", &hex::encode(digest)[..10])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_stable_and_shaped() {
        let id = adapter_identity("https://example.com:5000", "device1");
        assert_eq!(id.len(), 11);
        assert!(id.starts_with('_'));
        assert_eq!(id, adapter_identity("https://example.com:5000", "device1"));
    }

    #[test]
    fn identity_differs_per_source() {
        let a = adapter_identity("https://example.com:5000", "device1");
        let b = adapter_identity("https://example.com:5000", "device2");
        assert_ne!(a, b);
    }
}
