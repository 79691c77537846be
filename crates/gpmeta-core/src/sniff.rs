use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Header bytes needed to tell the supported image kinds apart (ftyp brands sit at 8..12).
const SNIFF_LEN: u64 = 32;

/// Image kinds recognized from file content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Jpeg,
    Png,
    Gif,
    Webp,
    Heic,
    Tiff,
    Bmp,
}

impl MediaKind {
    /// Extension a misdeclared file gets renamed to.
    pub fn canonical_extension(self) -> &'static str {
        match self {
            MediaKind::Jpeg => "jpg",
            MediaKind::Png => "png",
            MediaKind::Gif => "gif",
            MediaKind::Webp => "webp",
            MediaKind::Heic => "heic",
            MediaKind::Tiff => "tiff",
            MediaKind::Bmp => "bmp",
        }
    }

    /// Whether `ext` (without the dot, any case) is a valid spelling for this kind.
    pub fn accepts_extension(self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        match self {
            MediaKind::Jpeg => matches!(ext.as_str(), "jpg" | "jpeg" | "jpe" | "jfif"),
            MediaKind::Heic => matches!(ext.as_str(), "heic" | "heif"),
            MediaKind::Tiff => matches!(ext.as_str(), "tif" | "tiff"),
            other => ext == other.canonical_extension(),
        }
    }
}

/// Classify a file by its header. Unreadable files, video containers and
/// anything unrecognized yield `None`.
pub fn sniff(path: &Path) -> Option<MediaKind> {
    let file = File::open(path).ok()?;
    let mut header = Vec::with_capacity(SNIFF_LEN as usize);
    file.take(SNIFF_LEN).read_to_end(&mut header).ok()?;
    sniff_bytes(&header)
}

pub fn sniff_bytes(buf: &[u8]) -> Option<MediaKind> {
    if buf.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(MediaKind::Jpeg);
    }
    if buf.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some(MediaKind::Png);
    }
    if buf.starts_with(b"GIF87a") || buf.starts_with(b"GIF89a") {
        return Some(MediaKind::Gif);
    }
    if buf.len() >= 12 && buf.starts_with(b"RIFF") && &buf[8..12] == b"WEBP" {
        return Some(MediaKind::Webp);
    }
    // ISO BMFF: only still-image brands count, mp4/mov stay unknown
    if buf.len() >= 12 && &buf[4..8] == b"ftyp" {
        return match &buf[8..12] {
            b"heic" | b"heix" | b"heim" | b"heis" | b"hevc" | b"mif1" | b"msf1" => {
                Some(MediaKind::Heic)
            }
            _ => None,
        };
    }
    if buf.starts_with(&[0x49, 0x49, 0x2A, 0x00]) || buf.starts_with(&[0x4D, 0x4D, 0x00, 0x2A]) {
        return Some(MediaKind::Tiff);
    }
    if buf.len() >= 14 && buf.starts_with(b"BM") {
        return Some(MediaKind::Bmp);
    }
    None
}
