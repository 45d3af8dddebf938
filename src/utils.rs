use std::ffi::OsString;
use std::time::{SystemTime, UNIX_EPOCH};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Longest job id taken from a filename. The id names a directory and
/// prefixes every file inside it, so it must stay well under NAME_MAX.
pub const MAX_JOB_ID_CHARS: usize = 64;

/// Derives a job id from an uploaded filename: lower-cased, with every
/// character outside `[a-z0-9]` replaced by `_`, cut to
/// [`MAX_JOB_ID_CHARS`]. Without a usable filename the id falls back to
/// `job_<unix millis>`.
pub fn derive_job_id(filename: Option<&str>) -> String {
    match filename.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => name
            .chars()
            .take(MAX_JOB_ID_CHARS)
            .map(|c| {
                let c = c.to_ascii_lowercase();
                if c.is_ascii_lowercase() || c.is_ascii_digit() {
                    c
                } else {
                    '_'
                }
            })
            .collect(),
        None => {
            let millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis();
            format!("job_{}", millis)
        }
    }
}

/// Embeddable `data:` reference for audio that has no served URL.
pub fn audio_data_uri(bytes: &[u8]) -> String {
    format!("data:audio/wav;base64,{}", STANDARD.encode(bytes))
}

/// Accepts raw base64 or a full `data:<mime>;base64,<payload>` URI.
pub fn decode_base64_audio(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let trimmed = encoded.trim();
    let payload = match trimmed.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => trimmed,
    };
    STANDARD.decode(payload)
}

/// Keeps the first `max` characters.
pub fn truncate_head(text: &str, max: usize) -> String {
    let total = text.chars().count();
    if total <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max).collect();
    format!("{}... [truncated {} chars]", kept, total - max)
}

/// Keeps the last `max` characters.
pub fn truncate_tail(text: &str, max: usize) -> String {
    let total = text.chars().count();
    if total <= max {
        return text.to_string();
    }
    let kept: String = text.chars().skip(total - max).collect();
    format!("[truncated {} chars] ...{}", total - max, kept)
}

/// Arguments rendered for logs, each quoted on its own.
pub fn render_args(args: &[OsString]) -> String {
    args.iter()
        .map(|arg| format!("{:?}", arg.to_string_lossy()))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_is_sanitized_filename() {
        assert_eq!(derive_job_id(Some("Street Recording #2.WAV")), "street_recording__2_wav");
        assert_eq!(derive_job_id(Some("job_42")), "job_42");
    }

    #[test]
    fn long_filenames_are_capped() {
        let name = format!("{}.wav", "A".repeat(300));
        let id = derive_job_id(Some(&name));
        assert_eq!(id.len(), MAX_JOB_ID_CHARS);
        assert!(id.chars().all(|c| c == 'a'));
    }

    #[test]
    fn job_id_falls_back_to_timestamp() {
        let id = derive_job_id(None);
        assert!(id.starts_with("job_"));
        assert!(id["job_".len()..].chars().all(|c| c.is_ascii_digit()));
        assert!(derive_job_id(Some("   ")).starts_with("job_"));
    }

    #[test]
    fn decodes_plain_and_data_uri_base64() {
        assert_eq!(decode_base64_audio("UklGRg==").unwrap(), b"RIFF");
        assert_eq!(decode_base64_audio("data:audio/wav;base64,UklGRg==").unwrap(), b"RIFF");
        assert!(decode_base64_audio("not base64!").is_err());
    }

    #[test]
    fn data_uri_roundtrips_through_decoder() {
        let uri = audio_data_uri(b"RIFF");
        assert_eq!(uri, "data:audio/wav;base64,UklGRg==");
        assert_eq!(decode_base64_audio(&uri).unwrap(), b"RIFF");
    }

    #[test]
    fn truncation_marks_dropped_text() {
        assert_eq!(truncate_head("abcdef", 10), "abcdef");
        assert_eq!(truncate_head("abcdef", 3), "abc... [truncated 3 chars]");
        assert_eq!(truncate_tail("abcdef", 2), "[truncated 4 chars] ...ef");
    }

    #[test]
    fn rendered_args_quote_paths_with_spaces() {
        let args = vec![OsString::from("/My Codes/in.wav"), OsString::from("job_1")];
        assert_eq!(render_args(&args), "\"/My Codes/in.wav\" \"job_1\"");
    }
}
