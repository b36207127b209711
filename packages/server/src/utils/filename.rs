/// Reasons an uploaded file name is refused.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum FilenameError {
    #[error("Filename cannot be empty")]
    Empty,
    #[error("Filename must be at most 255 characters")]
    TooLong,
    #[error("Invalid filename: control characters are not allowed")]
    ControlCharacter,
    #[error("Invalid filename: hidden files (starting with '.') are not allowed")]
    Hidden,
}

/// Reduce a client-supplied upload name to its last path component and validate it.
///
/// Some browsers send full local paths (`C:\fakepath\run.mp4`); only the final
/// segment is kept. Control characters are rejected since the name ends up in
/// `Content-Disposition`.
pub fn sanitize_upload_name(raw: &str) -> Result<String, FilenameError> {
    let last = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if last.is_empty() || last == ".." {
        return Err(FilenameError::Empty);
    }
    if last.chars().any(|c| c.is_control()) {
        return Err(FilenameError::ControlCharacter);
    }
    if last.starts_with('.') {
        return Err(FilenameError::Hidden);
    }
    if last.chars().count() > 255 {
        return Err(FilenameError::TooLong);
    }
    Ok(last.to_string())
}

/// Build a `Content-Disposition` value with an ASCII fallback and an RFC 5987 `filename*`.
pub fn content_disposition(disposition: &str, filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .filter(|c| c.is_ascii_graphic() && !matches!(c, '"' | ';' | '\\'))
        .collect();
    let ascii = if ascii.is_empty() {
        "download".to_string()
    } else {
        ascii
    };

    let encoded: String = filename
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                String::from(b as char)
            }
            _ => format!("%{b:02X}"),
        })
        .collect();

    format!("{disposition}; filename=\"{ascii}\"; filename*=UTF-8''{encoded}")
}
