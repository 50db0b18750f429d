/// OSC events NeoTerm cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OscEvent {
    /// OSC 7;file://host/path  (decoded path)
    Cwd(String),

    /// OSC 0 / OSC 2 window title
    Title(String),

    /// Anything else (payload string, without terminator)
    Unknown(String),
}

/// Build an event from the `;`-separated parameters of one OSC sequence.
pub fn parse_osc_params(params: &[&[u8]]) -> Option<OscEvent> {
    let (first, rest) = params.split_first()?;
    let joined = || {
        rest.iter()
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .collect::<Vec<_>>()
            .join(";")
    };

    match *first {
        b"0" | b"2" => Some(OscEvent::Title(joined())),
        b"7" => Some(OscEvent::Cwd(decode_file_uri_to_path(&joined()))),
        _ => {
            let mut payload = String::from_utf8_lossy(first).into_owned();
            if !rest.is_empty() {
                payload.push(';');
                payload.push_str(&joined());
            }
            Some(OscEvent::Unknown(payload))
        }
    }
}

/// Accepts `file://host/path`, `file:///path` or a bare path.
pub fn decode_file_uri_to_path(uri: &str) -> String {
    let u = uri.trim();

    let path = match u.strip_prefix("file://") {
        // The authority runs up to the first '/'; hostnames are ignored.
        Some(rest) => match rest.find('/') {
            Some(i) => &rest[i..],
            None => "/",
        },
        None => u,
    };

    percent_decode(path)
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(b) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cwd_with_host() {
        let ev = parse_osc_params(&[b"7", b"file://myhost/home/me/My%20Docs"]);
        assert_eq!(ev, Some(OscEvent::Cwd("/home/me/My Docs".into())));
    }

    #[test]
    fn test_cwd_without_host() {
        assert_eq!(decode_file_uri_to_path("file:///tmp"), "/tmp");
        assert_eq!(decode_file_uri_to_path("/var/log"), "/var/log");
    }

    #[test]
    fn test_title_keeps_semicolons() {
        let ev = parse_osc_params(&[b"2", b"vim", b"main.rs"]);
        assert_eq!(ev, Some(OscEvent::Title("vim;main.rs".into())));
        let ev = parse_osc_params(&[b"0", b"htop"]);
        assert_eq!(ev, Some(OscEvent::Title("htop".into())));
    }

    #[test]
    fn test_unknown_payload() {
        let ev = parse_osc_params(&[b"133", b"A"]);
        assert_eq!(ev, Some(OscEvent::Unknown("133;A".into())));
        assert_eq!(parse_osc_params(&[]), None);
    }

    #[test]
    fn test_bad_percent_sequence_is_literal() {
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("a%zzb"), "a%zzb");
    }
}
