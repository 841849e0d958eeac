//! Extraction of form fields and an uploaded file from `multipart/form-data` bodies.
//!
//! The parser works directly on bytes: the body is split on `--<boundary>`, every segment
//! carrying a `Content-Disposition: form-data;` header is cut at the first blank line, and the
//! content is kept either as a text field or, when the header names a file, as the binary
//! payload.

use base64::{engine::general_purpose, Engine as _};
use std::collections::HashMap;

use crate::error::MultipartError;

const BOUNDARY_PARAM: &str = "boundary=";
const DISPOSITION_MARKER: &[u8] = b"Content-Disposition: form-data;";
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
const CRLF: &[u8] = b"\r\n";

/// Text fields and the optional uploaded file of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedMultipartBody {
    pub fields: HashMap<String, String>,
    /// Content of the last part that declared a `filename`.
    pub binary_payload: Option<Vec<u8>>,
}

impl ParsedMultipartBody {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Returns everything after the last `boundary=` of a `Content-Type` value, verbatim.
pub fn boundary(content_type: &str) -> Result<&str, MultipartError> {
    let start = content_type
        .rfind(BOUNDARY_PARAM)
        .map(|pos| pos + BOUNDARY_PARAM.len())
        .ok_or(MultipartError::EmptyBoundary)?;

    match &content_type[start..] {
        "" => Err(MultipartError::EmptyBoundary),
        boundary => Ok(boundary),
    }
}

/// Parses a base64-encoded multipart body.
pub fn parse_multipart_data(
    content_type: &str,
    body_data: &str,
) -> Result<ParsedMultipartBody, MultipartError> {
    let boundary = boundary(content_type)?;
    let body = general_purpose::STANDARD.decode(body_data)?;
    split_parts(boundary, &body)
}

/// Parses a multipart body that has already been decoded to raw bytes.
pub fn parse_multipart_bytes(
    content_type: &str,
    body: &[u8],
) -> Result<ParsedMultipartBody, MultipartError> {
    let boundary = boundary(content_type)?;
    split_parts(boundary, body)
}

/// Parses a request body as delivered by the HTTP layer.
///
/// API Gateway hands binary uploads over either still base64-encoded or already decoded,
/// depending on whether the payload was flagged as binary. A raw multipart body always opens
/// with a `--` delimiter, which never starts a base64 string.
pub fn parse_request_body(
    content_type: &str,
    body: &[u8],
) -> Result<ParsedMultipartBody, MultipartError> {
    if body.starts_with(b"--") {
        return parse_multipart_bytes(content_type, body);
    }

    let boundary = boundary(content_type)?;
    let decoded = general_purpose::STANDARD.decode(body)?;
    split_parts(boundary, &decoded)
}

fn split_parts(boundary: &str, body: &[u8]) -> Result<ParsedMultipartBody, MultipartError> {
    let delimiter = format!("--{boundary}");
    let mut parsed = ParsedMultipartBody::default();

    for (index, part) in split_on(body, delimiter.as_bytes()).into_iter().enumerate() {
        if find(part, DISPOSITION_MARKER).is_none() {
            continue;
        }

        let (header_area, content) = match find(part, HEADER_TERMINATOR) {
            Some(pos) => (&part[..pos], &part[pos + HEADER_TERMINATOR.len()..]),
            None => (part, &part[part.len()..]),
        };

        let header_area = std::str::from_utf8(header_area)
            .map_err(|source| MultipartError::Utf8 { part: index, source })?;
        let name = field_name(header_area).ok_or(MultipartError::MalformedPart { part: index })?;
        let content = strip_trailing_crlf(content);

        if header_area.contains("filename=\"") {
            parsed.binary_payload = Some(content.to_vec());
        } else {
            let value = std::str::from_utf8(content)
                .map_err(|source| MultipartError::Utf8 { part: index, source })?;
            parsed.fields.insert(name.to_string(), value.to_string());
        }
    }

    Ok(parsed)
}

/// Value of the first `name="..."` attribute; an unterminated value runs to the end.
fn field_name(header_area: &str) -> Option<&str> {
    let (_, rest) = header_area.split_once("name=\"")?;
    Some(rest.split('"').next().unwrap_or(rest))
}

fn strip_trailing_crlf(content: &[u8]) -> &[u8] {
    content.strip_suffix(CRLF).unwrap_or(content)
}

fn split_on<'a>(haystack: &'a [u8], delimiter: &[u8]) -> Vec<&'a [u8]> {
    let mut segments = Vec::new();
    let mut rest = haystack;

    while let Some(pos) = find(rest, delimiter) {
        segments.push(&rest[..pos]);
        rest = &rest[pos + delimiter.len()..];
    }
    segments.push(rest);

    segments
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    debug_assert!(!needle.is_empty(), "empty needle");
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR\r\n\xff\x00";

    fn text_part(name: &str, value: &str) -> (String, Vec<u8>) {
        (
            format!("Content-Disposition: form-data; name=\"{name}\""),
            value.as_bytes().to_vec(),
        )
    }

    fn file_part(name: &str, filename: &str, content: &[u8]) -> (String, Vec<u8>) {
        (
            format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: image/png"
            ),
            content.to_vec(),
        )
    }

    fn raw_body(boundary: &str, parts: &[(String, Vec<u8>)]) -> Vec<u8> {
        let mut body = Vec::new();
        for (headers, content) in parts {
            body.extend_from_slice(format!("--{boundary}\r\n{headers}\r\n\r\n").as_bytes());
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        body
    }

    fn encoded_body(boundary: &str, parts: &[(String, Vec<u8>)]) -> String {
        general_purpose::STANDARD.encode(raw_body(boundary, parts))
    }

    fn content_type(boundary: &str) -> String {
        format!("multipart/form-data; boundary={boundary}")
    }

    #[test]
    fn extracts_text_field_and_image() {
        let body = encoded_body(
            "XYZ",
            &[
                text_part("filename", "holiday.png"),
                file_part("image", "a.png", PNG_BYTES),
            ],
        );

        let parsed = parse_multipart_data(&content_type("XYZ"), &body).unwrap();

        assert_eq!(parsed.fields.len(), 1);
        assert_eq!(parsed.field("filename"), Some("holiday.png"));
        assert_eq!(parsed.binary_payload.as_deref(), Some(PNG_BYTES));
    }

    #[test]
    fn keeps_every_text_field_alongside_one_file() {
        let body = encoded_body(
            "----WebKitFormBoundary7MA4YWxkTrZu0gW",
            &[
                text_part("filename", "cat.png"),
                file_part("image", "cat.png", PNG_BYTES),
                text_part("customlabels", "cat, kitten"),
                text_part("caption", ""),
            ],
        );

        let parsed = parse_multipart_data(
            &content_type("----WebKitFormBoundary7MA4YWxkTrZu0gW"),
            &body,
        )
        .unwrap();

        assert_eq!(parsed.fields.len(), 3);
        assert_eq!(parsed.field("customlabels"), Some("cat, kitten"));
        assert_eq!(parsed.field("caption"), Some(""));
        assert_eq!(parsed.binary_payload.as_deref(), Some(PNG_BYTES));
    }

    #[test]
    fn no_file_part_means_no_payload() {
        let body = encoded_body(
            "b1",
            &[text_part("image_id", "42"), text_part("final_labels", "dog")],
        );

        let parsed = parse_multipart_data(&content_type("b1"), &body).unwrap();

        assert_eq!(parsed.fields.len(), 2);
        assert!(parsed.binary_payload.is_none());
    }

    #[test]
    fn last_file_part_wins() {
        let body = encoded_body(
            "b1",
            &[
                file_part("first", "one.png", b"first-image"),
                file_part("second", "two.png", b"second-image"),
            ],
        );

        let parsed = parse_multipart_data(&content_type("b1"), &body).unwrap();

        assert!(parsed.fields.is_empty());
        assert_eq!(parsed.binary_payload.as_deref(), Some(&b"second-image"[..]));
    }

    #[test]
    fn only_one_trailing_crlf_is_removed() {
        let body = encoded_body(
            "b1",
            &[
                text_part("note", "line\r\n"),
                file_part("image", "a.bin", b"\x00\r\n"),
            ],
        );

        let parsed = parse_multipart_data(&content_type("b1"), &body).unwrap();

        assert_eq!(parsed.field("note"), Some("line\r\n"));
        assert_eq!(parsed.binary_payload.as_deref(), Some(&b"\x00\r\n"[..]));
    }

    #[test]
    fn duplicate_field_names_keep_the_later_value() {
        let body = encoded_body(
            "b1",
            &[text_part("tag", "first"), text_part("tag", "second")],
        );

        let parsed = parse_multipart_data(&content_type("b1"), &body).unwrap();

        assert_eq!(parsed.field("tag"), Some("second"));
    }

    #[test]
    fn part_without_blank_line_has_empty_content() {
        let body = general_purpose::STANDARD
            .encode(b"--b1\r\nContent-Disposition: form-data; name=\"empty\"--b1--\r\n");

        let parsed = parse_multipart_data(&content_type("b1"), &body).unwrap();

        assert_eq!(parsed.field("empty"), Some(""));
    }

    #[test]
    fn first_name_attribute_is_used() {
        let body = encoded_body(
            "b1",
            &[(
                "Content-Disposition: form-data; filename=\"x.png\"; name=\"image\"".to_string(),
                b"bytes".to_vec(),
            )],
        );

        // `filename="` contains `name="`, so the file name is the first match; the part is
        // still classified as binary.
        let parsed = parse_multipart_data(&content_type("b1"), &body).unwrap();

        assert!(parsed.fields.is_empty());
        assert_eq!(parsed.binary_payload.as_deref(), Some(&b"bytes"[..]));
    }

    #[test]
    fn quoted_boundary_never_splits_the_body() {
        let body = encoded_body("XYZ", &[text_part("filename", "a.png")]);

        let parsed =
            parse_multipart_data("multipart/form-data; boundary=\"XYZ\"", &body).unwrap();

        // The whole body is read as a single part.
        assert_eq!(parsed.field("filename"), Some("a.png\r\n--XYZ--"));
        assert!(parsed.binary_payload.is_none());
    }

    #[test]
    fn boundary_is_taken_after_the_last_parameter() {
        assert_eq!(
            boundary("multipart/form-data; boundary=abc; boundary=def").unwrap(),
            "def"
        );
        assert_eq!(boundary("multipart/form-data; boundary= x").unwrap(), " x");
    }

    #[test]
    fn missing_or_empty_boundary_is_rejected() {
        assert!(matches!(
            boundary("multipart/form-data"),
            Err(MultipartError::EmptyBoundary)
        ));
        assert!(matches!(
            parse_multipart_data("multipart/form-data; boundary=", ""),
            Err(MultipartError::EmptyBoundary)
        ));
    }

    #[test]
    fn invalid_base64_is_a_decode_error() {
        let err = parse_multipart_data(&content_type("b1"), "not base64!").unwrap_err();
        assert!(matches!(err, MultipartError::Decode(_)));
    }

    #[test]
    fn header_without_name_is_malformed() {
        let body = encoded_body(
            "b1",
            &[
                text_part("ok", "1"),
                ("Content-Disposition: form-data; id=\"x\"".to_string(), b"2".to_vec()),
            ],
        );

        let err = parse_multipart_data(&content_type("b1"), &body).unwrap_err();

        assert!(matches!(err, MultipartError::MalformedPart { part: 2 }));
    }

    #[test]
    fn invalid_utf8_text_part_is_an_error() {
        let body = encoded_body(
            "b1",
            &[
                text_part("ok", "1"),
                (
                    "Content-Disposition: form-data; name=\"bad\"".to_string(),
                    vec![0xff, 0xfe],
                ),
            ],
        );

        let err = parse_multipart_data(&content_type("b1"), &body).unwrap_err();

        assert!(matches!(err, MultipartError::Utf8 { part: 2, .. }));
    }

    #[test]
    fn request_body_accepts_raw_and_encoded_forms() {
        let parts = [
            text_part("filename", "dog.png"),
            file_part("image", "dog.png", PNG_BYTES),
        ];
        let raw = raw_body("b1", &parts);
        let encoded = encoded_body("b1", &parts);

        let from_raw = parse_request_body(&content_type("b1"), &raw).unwrap();
        let from_encoded = parse_request_body(&content_type("b1"), encoded.as_bytes()).unwrap();

        assert_eq!(from_raw, from_encoded);
        assert_eq!(from_raw.binary_payload.as_deref(), Some(PNG_BYTES));
    }

    #[test]
    fn find_locates_first_occurrence() {
        assert_eq!(find(b"a--b--c", b"--"), Some(1));
        assert_eq!(find(b"abc", b"abcd"), None);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "empty needle")]
    fn find_rejects_empty_needle() {
        find(b"abc", b"");
    }
}
