use parley_core::{OracleError, clamp_unit};

/// Extract `k` utterances from a one-per-line model answer.
///
/// List markers and wrapping quotes are removed and blank lines skipped.
/// Extra lines are ignored; fewer than `k` usable lines is `Malformed`.
pub fn parse_candidates(text: &str, k: usize) -> Result<Vec<String>, OracleError> {
    let candidates: Vec<String> = text
        .lines()
        .map(clean_candidate)
        .filter(|line| !line.is_empty())
        .take(k)
        .map(str::to_owned)
        .collect();

    if candidates.len() < k {
        return Err(OracleError::Malformed(format!(
            "expected {k} responses, got {}",
            candidates.len()
        )));
    }
    Ok(candidates)
}

/// Read the first number in a model answer as a score, clamped to `[0, 1]`.
pub fn parse_score(text: &str) -> Result<f64, OracleError> {
    let token = first_number(text)
        .ok_or_else(|| OracleError::Malformed(format!("no number in {text:?}")))?;
    let value: f64 = token
        .parse()
        .map_err(|_| OracleError::Malformed(format!("unparseable number {token:?}")))?;
    clamp_unit(value).ok_or_else(|| OracleError::Malformed(format!("non-finite score {token:?}")))
}

fn clean_candidate(line: &str) -> &str {
    let mut text = line.trim();

    if let Some(rest) = text.strip_prefix(['-', '*', '•']) {
        text = rest.trim_start();
    } else {
        let digits = text.bytes().take_while(u8::is_ascii_digit).count();
        if digits > 0 {
            if let Some(rest) = text[digits..].strip_prefix(['.', ')']) {
                text = rest.trim_start();
            }
        }
    }

    strip_quotes(text)
}

fn strip_quotes(text: &str) -> &str {
    for (open, close) in [('"', '"'), ('\'', '\''), ('“', '”')] {
        if let Some(inner) = text
            .strip_prefix(open)
            .and_then(|rest| rest.strip_suffix(close))
        {
            return inner.trim();
        }
    }
    text
}

fn first_number(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let digit_at = |i: usize| bytes.get(i).is_some_and(u8::is_ascii_digit);

    let start = (0..bytes.len()).find(|&i| {
        digit_at(i) || (matches!(bytes[i], b'-' | b'.') && digit_at(i + 1))
    })?;

    let mut seen_dot = bytes[start] == b'.';
    let mut end = start + 1;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => end += 1,
            b'.' if !seen_dot && digit_at(end + 1) => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }
    Some(&text[start..end])
}
