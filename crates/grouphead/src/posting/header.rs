use bytes::Bytes;

/// Why a head could not be parsed.
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("header line {line} has no field name")]
    MissingName { line: usize },
    #[error("continuation line {line} before the first header")]
    DanglingContinuation { line: usize },
}

/// The header fields a post needs, plus the raw head.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeadInfo {
    pub raw: Bytes,
    pub subject: Bytes,
    pub from: Bytes,
    pub date: Bytes,
    pub message_id: Bytes,
    pub references: Bytes,
    pub newsgroups: Bytes,
}

/// Splits an article at the first empty line into head and body. Without an
/// empty line the whole article is head.
pub fn split_article(raw: &Bytes) -> (Bytes, Bytes) {
    let mut start = 0;
    while start < raw.len() {
        let end = raw[start..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(raw.len(), |p| start + p);
        let line = &raw[start..end];
        if line.is_empty() || line == b"\r" {
            let body_start = (end + 1).min(raw.len());
            // Drop the line break ending the head.
            let head_end = start.saturating_sub(1);
            let head_end = if head_end > 0 && raw[head_end - 1] == b'\r' {
                head_end - 1
            } else {
                head_end
            };
            return (raw.slice(..head_end), raw.slice(body_start..));
        }
        start = end + 1;
    }
    (raw.clone(), Bytes::new())
}

fn trim(value: &[u8]) -> &[u8] {
    value.trim_ascii()
}

/// Parses a head into [`HeadInfo`]. Folded lines are unfolded; field names
/// match case-insensitively; unknown fields are ignored.
pub fn parse_head(raw: Bytes) -> Result<HeadInfo, HeaderError> {
    let mut fields: Vec<(&[u8], Vec<u8>)> = Vec::new();
    for (n, line) in raw.split(|&b| b == b'\n').enumerate() {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        if line[0] == b' ' || line[0] == b'\t' {
            let Some((_, value)) = fields.last_mut() else {
                return Err(HeaderError::DanglingContinuation { line: n + 1 });
            };
            value.push(b' ');
            value.extend_from_slice(trim(line));
            continue;
        }
        let Some(colon) = line.iter().position(|&b| b == b':') else {
            return Err(HeaderError::MissingName { line: n + 1 });
        };
        let name = trim(&line[..colon]);
        if name.is_empty() {
            return Err(HeaderError::MissingName { line: n + 1 });
        }
        fields.push((name, trim(&line[colon + 1..]).to_vec()));
    }

    let mut info = HeadInfo::default();
    for (name, value) in fields {
        let slot = match name.to_ascii_lowercase().as_slice() {
            b"subject" => &mut info.subject,
            b"from" => &mut info.from,
            b"date" => &mut info.date,
            b"message-id" => &mut info.message_id,
            b"references" => &mut info.references,
            b"newsgroups" => &mut info.newsgroups,
            _ => continue,
        };
        // First occurrence wins.
        if slot.is_empty() {
            *slot = Bytes::from(value);
        }
    }
    info.raw = raw;
    Ok(info)
}

/// Splits a Newsgroups value on commas, trimming names and dropping empty
/// and repeated ones while keeping first-seen order.
pub fn split_newsgroups(value: &[u8]) -> Vec<Bytes> {
    let mut groups: Vec<Bytes> = Vec::new();
    for name in value.split(|&b| b == b',').map(trim) {
        if !name.is_empty() && !groups.iter().any(|g| g[..] == *name) {
            groups.push(Bytes::copy_from_slice(name));
        }
    }
    groups
}

/// Number of lines in a body.
pub fn count_lines(body: &[u8]) -> i64 {
    body.iter().filter(|&&b| b == b'\n').count() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_at_first_blank_line() {
        let raw = Bytes::from_static(b"Subject: a\r\nFrom: b\r\n\r\nbody\r\n\r\nmore\r\n");
        let (head, body) = split_article(&raw);
        assert_eq!(&head[..], b"Subject: a\r\nFrom: b");
        assert_eq!(&body[..], b"body\r\n\r\nmore\r\n");

        let raw = Bytes::from_static(b"Subject: a\n\nbody\n");
        let (head, body) = split_article(&raw);
        assert_eq!(&head[..], b"Subject: a");
        assert_eq!(&body[..], b"body\n");

        let (head, body) = split_article(&Bytes::from_static(b"Subject: a\n"));
        assert_eq!(&head[..], b"Subject: a\n");
        assert!(body.is_empty());

        let (head, body) = split_article(&Bytes::from_static(b"\r\nbody"));
        assert!(head.is_empty());
        assert_eq!(&body[..], b"body");
    }

    #[test]
    fn parses_folded_headers() {
        let head = Bytes::from_static(
            b"Subject: Hello\r\n\tworld\r\nmessage-id: <1@x>\r\nNewsgroups: alt.test\r\nX-Other: 1\r\nSubject: ignored",
        );
        let info = parse_head(head).unwrap();
        assert_eq!(&info.subject[..], b"Hello world");
        assert_eq!(&info.message_id[..], b"<1@x>");
        assert_eq!(&info.newsgroups[..], b"alt.test");
        assert!(info.from.is_empty());
    }

    #[test]
    fn rejects_malformed_heads() {
        assert_eq!(
            parse_head(Bytes::from_static(b" leading continuation")),
            Err(HeaderError::DanglingContinuation { line: 1 })
        );
        assert_eq!(
            parse_head(Bytes::from_static(b"Subject: a\r\nno colon here")),
            Err(HeaderError::MissingName { line: 2 })
        );
        assert_eq!(
            parse_head(Bytes::from_static(b": empty name")),
            Err(HeaderError::MissingName { line: 1 })
        );
    }

    #[test]
    fn newsgroups_are_trimmed_and_deduplicated() {
        let groups = split_newsgroups(b" alt.test, misc.test,,alt.test ,comp.lang.rust");
        let names: Vec<&[u8]> = groups.iter().map(|g| &g[..]).collect();
        assert_eq!(names, vec![&b"alt.test"[..], &b"misc.test"[..], &b"comp.lang.rust"[..]]);
        assert!(split_newsgroups(b" , ").is_empty());
    }

    #[test]
    fn counts_lines() {
        assert_eq!(count_lines(b""), 0);
        assert_eq!(count_lines(b"a\r\nb\r\n"), 2);
    }
}
