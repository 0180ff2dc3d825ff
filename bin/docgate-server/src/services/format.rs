//! Input allow-list, content sniffing and the fixed PDF target.

use std::path::Path;

use strum::{AsRefStr, Display};

/// Physical container of an accepted input document. Content inspection
/// establishes the container; the extension only has to agree with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Container {
    /// OOXML and OpenDocument packages.
    Zip,
    /// Legacy compound-file documents (doc, xls, ppt).
    Ole,
    Rtf,
    Text,
}

#[derive(Debug, PartialEq, Eq)]
pub struct InputFormat {
    pub extension: &'static str,
    pub mime: &'static str,
    pub container: Container,
}

pub const INPUT_FORMATS: &[InputFormat] = &[
    InputFormat {
        extension: "docx",
        mime: "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        container: Container::Zip,
    },
    InputFormat {
        extension: "xlsx",
        mime: "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        container: Container::Zip,
    },
    InputFormat {
        extension: "pptx",
        mime: "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        container: Container::Zip,
    },
    InputFormat {
        extension: "odt",
        mime: "application/vnd.oasis.opendocument.text",
        container: Container::Zip,
    },
    InputFormat {
        extension: "ods",
        mime: "application/vnd.oasis.opendocument.spreadsheet",
        container: Container::Zip,
    },
    InputFormat {
        extension: "odp",
        mime: "application/vnd.oasis.opendocument.presentation",
        container: Container::Zip,
    },
    InputFormat {
        extension: "doc",
        mime: "application/msword",
        container: Container::Ole,
    },
    InputFormat {
        extension: "xls",
        mime: "application/vnd.ms-excel",
        container: Container::Ole,
    },
    InputFormat {
        extension: "ppt",
        mime: "application/vnd.ms-powerpoint",
        container: Container::Ole,
    },
    InputFormat {
        extension: "rtf",
        mime: "application/rtf",
        container: Container::Rtf,
    },
    InputFormat {
        extension: "txt",
        mime: "text/plain",
        container: Container::Text,
    },
    InputFormat {
        extension: "csv",
        mime: "text/csv",
        container: Container::Text,
    },
];

/// Output format produced by the converter.
#[derive(Debug, PartialEq, Eq)]
pub struct TargetFormat {
    pub extension: &'static str,
    pub mime: &'static str,
    /// Leading bytes every valid output starts with.
    pub magic: &'static [u8],
    /// Value passed to the converter's `--convert-to`.
    pub filter: &'static str,
}

impl TargetFormat {
    pub fn matches_signature(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(self.magic)
    }

    pub fn attachment_name(&self) -> String {
        format!("converted.{}", self.extension)
    }
}

pub const PDF: TargetFormat = TargetFormat {
    extension: "pdf",
    mime: "application/pdf",
    magic: b"%PDF-",
    filter: "pdf",
};

pub fn allowed_extensions() -> String {
    INPUT_FORMATS
        .iter()
        .map(|f| f.extension)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn by_extension(ext: &str) -> Option<&'static InputFormat> {
    INPUT_FORMATS
        .iter()
        .find(|f| f.extension.eq_ignore_ascii_case(ext))
}

/// Maps a client-declared content type back to an allow-listed format.
/// Parameters such as `; charset=utf-8` are ignored.
pub fn by_mime(declared: &str) -> Option<&'static InputFormat> {
    let essence = declared.split(';').next().unwrap_or("").trim();
    INPUT_FORMATS
        .iter()
        .find(|f| f.mime.eq_ignore_ascii_case(essence))
}

/// Lower-cased extension of a client supplied file name. Only the last path
/// segment is considered, whichever separator the client used.
pub fn extension_of(file_name: &str) -> Option<String> {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    Path::new(base)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(str::to_ascii_lowercase)
}

/// What the leading bytes of an upload look like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sniffed {
    Container(Container),
    /// Recognised, but not a document we accept.
    Other(String),
    Unknown,
}

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const RTF_MAGIC: &[u8] = b"{\\rtf";
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

/// How much of a text upload is checked for binary content.
const TEXT_SAMPLE: usize = 8192;

pub fn sniff(bytes: &[u8]) -> Sniffed {
    if let Some(kind) = infer::get(bytes) {
        let mime = kind.mime_type();
        return match mime {
            "application/zip" => Sniffed::Container(Container::Zip),
            _ if mime.starts_with("application/vnd.openxmlformats-officedocument.")
                || mime.starts_with("application/vnd.oasis.opendocument.") =>
            {
                Sniffed::Container(Container::Zip)
            }
            "application/msword"
            | "application/vnd.ms-excel"
            | "application/vnd.ms-powerpoint"
            | "application/x-ole-storage" => Sniffed::Container(Container::Ole),
            "application/rtf" | "text/rtf" => Sniffed::Container(Container::Rtf),
            _ if mime.starts_with("text/") && looks_like_text(bytes) => {
                Sniffed::Container(Container::Text)
            }
            _ => Sniffed::Other(mime.to_owned()),
        };
    }

    if bytes.starts_with(ZIP_MAGIC) {
        Sniffed::Container(Container::Zip)
    } else if bytes.starts_with(OLE_MAGIC) {
        Sniffed::Container(Container::Ole)
    } else if bytes.starts_with(RTF_MAGIC) {
        Sniffed::Container(Container::Rtf)
    } else if looks_like_text(bytes) {
        Sniffed::Container(Container::Text)
    } else {
        Sniffed::Unknown
    }
}

/// Plain text in any encoding a spreadsheet or editor commonly saves:
/// UTF-16 behind a byte-order mark, UTF-8, or a legacy single-byte code page
/// such as Windows-1252. The last is recognised by the absence of control
/// bytes other than tab, line feed, form feed and carriage return.
fn looks_like_text(bytes: &[u8]) -> bool {
    let truncated = bytes.len() > TEXT_SAMPLE;
    let sample = &bytes[..bytes.len().min(TEXT_SAMPLE)];

    if let Some(body) = sample.strip_prefix(UTF16_LE_BOM) {
        return utf16_text(body, u16::from_le_bytes, truncated);
    }
    if let Some(body) = sample.strip_prefix(UTF16_BE_BOM) {
        return utf16_text(body, u16::from_be_bytes, truncated);
    }

    if sample.contains(&0) {
        return false;
    }
    match std::str::from_utf8(sample) {
        Ok(_) => true,
        // A multi-byte sequence cut off by the sample window.
        Err(e) if e.error_len().is_none() && truncated => true,
        Err(_) => sample.iter().all(|&b| !is_binary_control(b)),
    }
}

fn utf16_text(body: &[u8], unit: fn([u8; 2]) -> u16, truncated: bool) -> bool {
    let mut units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| unit([pair[0], pair[1]]))
        .collect();
    if truncated {
        // May end half way through a surrogate pair.
        units.pop();
    }
    char::decode_utf16(units).all(|c| match c {
        Ok(c) => !c.is_control() || matches!(c, '\t' | '\n' | '\x0c' | '\r'),
        Err(_) => false,
    })
}

fn is_binary_control(b: u8) -> bool {
    (b < 0x20 && !matches!(b, b'\t' | b'\n' | 0x0c | b'\r')) || b == 0x7f
}

/// Checks that the content of an upload agrees with its claimed format.
pub fn verify_content(format: &InputFormat, bytes: &[u8]) -> Result<(), String> {
    match sniff(bytes) {
        Sniffed::Container(c) if c == format.container => Ok(()),
        Sniffed::Container(c) => Err(format!(
            "content looks like a {c} document, which does not match the .{} extension",
            format.extension
        )),
        Sniffed::Other(mime) => Err(format!(
            "content is {mime}, not a .{} document",
            format.extension
        )),
        Sniffed::Unknown => Err(format!(
            "content is not recognisable as a .{} document",
            format.extension
        )),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn extension_uses_last_path_segment() {
        assert_eq!(extension_of("report.DOCX").as_deref(), Some("docx"));
        assert_eq!(extension_of("a.tar.odt").as_deref(), Some("odt"));
        assert_eq!(extension_of("../../etc/passwd"), None);
        assert_eq!(extension_of("C:\\Users\\x\\notes.txt").as_deref(), Some("txt"));
        assert_eq!(extension_of("dir.docx/README"), None);
        assert_eq!(extension_of("trailing."), None);
        assert_eq!(extension_of(".bashrc"), None);
    }

    #[test]
    fn shell_metacharacters_do_not_affect_extension() {
        assert_eq!(
            extension_of("\"; rm -rf /tmp; echo .txt").as_deref(),
            Some("txt")
        );
        assert_eq!(extension_of("$(reboot).docx").as_deref(), Some("docx"));
    }

    #[test]
    fn lookup_by_extension_and_mime() {
        assert_eq!(by_extension("XLSX").map(|f| f.container), Some(Container::Zip));
        assert!(by_extension("exe").is_none());
        assert_eq!(
            by_mime("text/plain; charset=utf-8").map(|f| f.extension),
            Some("txt")
        );
        assert_eq!(by_mime("application/msword").map(|f| f.extension), Some("doc"));
        assert!(by_mime("application/octet-stream").is_none());
    }

    #[test]
    fn sniffs_raw_containers() {
        let mut ole = OLE_MAGIC.to_vec();
        ole.extend_from_slice(&[0u8; 504]);
        assert_eq!(sniff(&ole), Sniffed::Container(Container::Ole));
        assert_eq!(
            sniff(b"{\\rtf1\\ansi hello}"),
            Sniffed::Container(Container::Rtf)
        );
        assert_eq!(
            sniff("name,qty\nwidget,3\nüber,1\n".as_bytes()),
            Sniffed::Container(Container::Text)
        );
    }

    #[test]
    fn zip_header_is_a_package() {
        let mut zip = ZIP_MAGIC.to_vec();
        zip.extend_from_slice(&[0x14, 0, 0, 0, 8, 0]);
        zip.extend_from_slice(&[0u8; 64]);
        assert_eq!(sniff(&zip), Sniffed::Container(Container::Zip));
    }

    #[test]
    fn binary_formats_are_identified() {
        let png = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01\x08\x02\0\0\0";
        assert_eq!(sniff(png), Sniffed::Other("image/png".into()));
        assert_eq!(sniff(&[0u8, 1, 2, 3, 0xff]), Sniffed::Unknown);
    }

    #[test]
    fn verify_rejects_mismatched_content() {
        let docx = by_extension("docx").unwrap();
        let err = verify_content(docx, b"just some words").unwrap_err();
        assert!(err.contains("text"), "{err}");

        let txt = by_extension("txt").unwrap();
        assert!(verify_content(txt, b"just some words").is_ok());
        assert!(verify_content(txt, b"%PDF-1.7\n\0\0binary").is_err());
    }

    #[test]
    fn legacy_code_page_csv_is_text() {
        let csv = by_extension("csv").unwrap();
        assert!(verify_content(csv, b"name;city\nJos\xe9;M\xfcnchen\n").is_ok());
        assert!(verify_content(csv, b"price\r\n\x80 12\r\n").is_ok());
    }

    #[test]
    fn utf16_with_bom_is_text() {
        let txt = by_extension("txt").unwrap();
        let mut le = vec![0xFF, 0xFE];
        for unit in "Grüße\r\n".encode_utf16() {
            le.extend_from_slice(&unit.to_le_bytes());
        }
        assert!(verify_content(txt, &le).is_ok());

        let mut be = vec![0xFE, 0xFF];
        for unit in "hello\n".encode_utf16() {
            be.extend_from_slice(&unit.to_be_bytes());
        }
        assert_eq!(sniff(&be), Sniffed::Container(Container::Text));
    }

    #[test]
    fn control_bytes_are_not_text() {
        assert_eq!(sniff(b"abc\x01\x02\xff\xfe"), Sniffed::Unknown);
        assert_eq!(sniff(&[0xFF, 0xFE, 0x01, 0x00, 0x02, 0x00]), Sniffed::Unknown);
    }

    #[test]
    fn pdf_signature() {
        assert!(PDF.matches_signature(b"%PDF-1.4\n%stub"));
        assert!(!PDF.matches_signature(b"<html>"));
        assert!(!PDF.matches_signature(b"%PD"));
        assert_eq!(PDF.attachment_name(), "converted.pdf");
    }
}
