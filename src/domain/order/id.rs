use chrono::Utc;
use rand::Rng;

// Lowercase alphanumerics keep the id shell-safe and case-insensitive.
const SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 6;

/// Mint a new order identifier: `ORD-<epoch-seconds>-<6 char suffix>`.
///
/// The timestamp makes ids human-decodable and roughly sortable; the random
/// suffix avoids collisions without any cross-process coordination.
pub fn new_order_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_CHARSET[rng.gen_range(0..SUFFIX_CHARSET.len())] as char)
        .collect();
    format!("ORD-{}-{}", Utc::now().timestamp(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_order_id_format() {
        let id = new_order_id();
        let parts: Vec<&str> = id.splitn(3, '-').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ORD");
        assert!(parts[1].parse::<i64>().unwrap() > 0);
        assert_eq!(parts[2].len(), SUFFIX_LEN);
        assert!(parts[2]
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
    }

    #[test]
    fn test_order_ids_are_unique() {
        let ids: HashSet<String> = (0..500).map(|_| new_order_id()).collect();
        assert_eq!(ids.len(), 500);
    }
}
