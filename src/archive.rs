// archive.rs - ZIP packaging of batch results

use std::collections::HashSet;
use std::io::{Cursor, Write};

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::batch::BatchItem;
use crate::codec::Variant;
use crate::error::ArchiveError;
use crate::mime;
use crate::session::DisplayFormat;

/// Folder every entry is placed under.
pub const ARCHIVE_FOLDER: &str = "compressed";

/// Entry name and payload for each successful item in the chosen format.
///
/// Items without a WebP variant contribute their primary output. Colliding
/// names get a numeric suffix.
pub fn archive_entries(items: &[BatchItem], format: DisplayFormat) -> Vec<(String, Variant)> {
    let mut taken = HashSet::new();
    let mut entries = Vec::new();

    for result in items.iter().filter_map(BatchItem::result) {
        let variant = format.variant_of(result).clone();
        let base = mime::base_name(&result.file_name);
        let ext = variant.mime.extension().to_string();

        let mut name = format!("{}/{}.{}", ARCHIVE_FOLDER, base, ext);
        let mut n = 2;
        while !taken.insert(name.clone()) {
            name = format!("{}/{}-{}.{}", ARCHIVE_FOLDER, base, n, ext);
            n += 1;
        }
        entries.push((name, variant));
    }

    entries
}

/// Builds the archive in memory.
pub fn build_zip(items: &[BatchItem], format: DisplayFormat) -> Result<Vec<u8>, ArchiveError> {
    let entries = archive_entries(items, format);
    if entries.is_empty() {
        return Err(ArchiveError::Empty);
    }

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    // Images are already compressed.
    let options = FileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, variant) in &entries {
        zip.start_file(name.as_str(), options)?;
        zip.write_all(&variant.bytes)?;
    }
    let cursor = zip.finish()?;

    log::info!("Packed {} images into archive", entries.len());
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::ItemOutcome;
    use crate::codec::{ImageMeta, ProcessedResult};
    use crate::mime::MimeType;
    use std::io::Read;

    fn succeeded(name: &str, webp: bool) -> BatchItem {
        let meta = ImageMeta {
            size: 3,
            width: 1,
            height: 1,
            mime: MimeType::jpeg(),
        };
        BatchItem {
            file_name: name.into(),
            outcome: ItemOutcome::Succeeded(ProcessedResult {
                file_name: name.into(),
                original: meta.clone(),
                processed: meta,
                primary: Variant::new(b"jpg".to_vec(), MimeType::jpeg()),
                webp: webp.then(|| Variant::new(b"webp".to_vec(), MimeType::webp())),
            }),
        }
    }

    #[test]
    fn entries_use_selected_format() {
        let items = vec![
            succeeded("a.jpeg", true),
            BatchItem {
                file_name: "b.jpg".into(),
                outcome: ItemOutcome::Failed("decode".into()),
            },
            succeeded("c.jpg", false),
        ];

        let names: Vec<String> = archive_entries(&items, DisplayFormat::WebP)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, ["compressed/a.webp", "compressed/c.jpg"]);

        let names: Vec<String> = archive_entries(&items, DisplayFormat::Primary)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, ["compressed/a.jpg", "compressed/c.jpg"]);
    }

    #[test]
    fn duplicate_names_are_suffixed() {
        let items = vec![succeeded("a.jpg", false), succeeded("a.jpeg", false)];
        let names: Vec<String> = archive_entries(&items, DisplayFormat::Primary)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, ["compressed/a.jpg", "compressed/a-2.jpg"]);
    }

    #[test]
    fn zip_round_trips_payloads() {
        let bytes = build_zip(&[succeeded("a.jpg", true)], DisplayFormat::WebP).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 1);

        let mut entry = archive.by_name("compressed/a.webp").unwrap();
        let mut payload = Vec::new();
        entry.read_to_end(&mut payload).unwrap();
        assert_eq!(payload, b"webp");
    }

    #[test]
    fn empty_batch_has_nothing_to_pack() {
        let failed = BatchItem {
            file_name: "x.png".into(),
            outcome: ItemOutcome::Failed("nope".into()),
        };
        assert!(matches!(build_zip(&[failed], DisplayFormat::Primary), Err(ArchiveError::Empty)));
    }
}
