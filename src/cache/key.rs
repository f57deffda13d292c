//! Stable cache keys for requests.

use sha2::{Digest, Sha256};
use url::Url;

/// Key under which a GET for `url` is cached.
///
/// Fragments never reach the server, so they are ignored; the query string
/// is part of the key.
pub fn request_key(url: &Url) -> String {
  let mut normalized = url.clone();
  normalized.set_fragment(None);

  // SHA256 hash for stable, fixed-length keys
  let mut hasher = Sha256::new();
  hasher.update(normalized.as_str().as_bytes());
  hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_fragment_is_ignored() {
    assert_eq!(
      request_key(&url("http://localhost:5100/library.html")),
      request_key(&url("http://localhost:5100/library.html#favourites"))
    );
  }

  #[test]
  fn test_query_is_significant() {
    assert_ne!(
      request_key(&url("http://localhost:5100/static/data/drills.json")),
      request_key(&url("http://localhost:5100/static/data/drills.json?v=2"))
    );
  }

  #[test]
  fn test_key_is_hex_sha256() {
    let key = request_key(&url("http://localhost:5100/"));
    assert_eq!(key.len(), 64);
    assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
  }
}
