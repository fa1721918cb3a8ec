use super::error::MetainfoError;
use super::info_hash::InfoHash;
use std::collections::HashMap;

/// A parsed magnet link ([BEP-9]).
///
/// Magnet links identify a torrent by its info hash alone; the info
/// dictionary is fetched from peers through the metadata exchange.
///
/// # Format
///
/// ```text
/// magnet:?xt=urn:btih:<40-hex-info-hash>&dn=<name>&tr=<tracker>
/// ```
///
/// # Examples
///
/// ```
/// use bitfetch::metainfo::MagnetLink;
///
/// let uri = "magnet:?xt=urn:btih:c12fe1c06bba254a9dc9f519b335aa7c1367a88a\
///            &dn=Example&tr=http%3A%2F%2Ftracker.example.com%2Fannounce";
///
/// let magnet = MagnetLink::parse(uri).unwrap();
/// assert_eq!(magnet.display_name.as_deref(), Some("Example"));
/// assert_eq!(magnet.tracker, "http://tracker.example.com/announce");
/// ```
///
/// [BEP-9]: http://bittorrent.org/beps/bep_0009.html
#[derive(Debug, Clone)]
pub struct MagnetLink {
    /// The torrent's info hash, from the `xt` parameter.
    pub info_hash: InfoHash,
    /// Suggested display name, from the `dn` parameter.
    pub display_name: Option<String>,
    /// Tracker URL, from the `tr` parameter.
    pub tracker: String,
}

impl MagnetLink {
    /// Parses a magnet URI.
    ///
    /// The `xt` parameter must carry `urn:btih:` followed by 40 hex
    /// characters (case-insensitive) and `tr` must name a tracker; `dn` is
    /// optional and unknown parameters are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`MetainfoError::InvalidMagnetLink`] naming the offending
    /// parameter.
    pub fn parse(uri: &str) -> Result<Self, MetainfoError> {
        if !uri.starts_with("magnet:?") {
            return Err(MetainfoError::InvalidMagnetLink(
                "missing magnet:? prefix".into(),
            ));
        }

        let query = &uri[8..];
        let params = parse_query_string(query);

        let xt = params
            .get("xt")
            .and_then(|v| v.first())
            .ok_or_else(|| MetainfoError::InvalidMagnetLink("missing xt parameter".into()))?;

        let hash = xt.strip_prefix("urn:btih:").ok_or_else(|| {
            MetainfoError::InvalidMagnetLink("xt is not a urn:btih topic".into())
        })?;

        let info_hash = InfoHash::from_hex(hash)
            .map_err(|_| MetainfoError::InvalidMagnetLink("invalid info hash in xt".into()))?;

        let display_name = params
            .get("dn")
            .and_then(|v| v.first())
            .map(|s| url_decode(s));

        let tracker = params
            .get("tr")
            .and_then(|v| v.first())
            .map(|s| url_decode(s))
            .ok_or_else(|| MetainfoError::InvalidMagnetLink("missing tr parameter".into()))?;

        Ok(Self {
            info_hash,
            display_name,
            tracker,
        })
    }
}

fn parse_query_string(query: &str) -> HashMap<String, Vec<String>> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();

    for part in query.split('&') {
        if let Some((key, value)) = part.split_once('=') {
            params
                .entry(key.to_string())
                .or_default()
                .push(value.to_string());
        }
    }

    params
}

fn url_decode(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '%' {
            let hex: String = chars.by_ref().take(2).collect();
            if hex.len() == 2 {
                if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                    result.push(byte as char);
                    continue;
                }
            }
            result.push('%');
            result.push_str(&hex);
        } else if c == '+' {
            result.push(' ');
        } else {
            result.push(c);
        }
    }

    result
}
