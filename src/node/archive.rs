use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use zip::result::ZipResult;

/// Unpack a zip archive into `dest`, overwriting existing files.
///
/// Entries whose names would escape `dest` are skipped. Returns the written
/// file paths in archive order.
pub(crate) fn extract_zip(archive: &Path, dest: &Path) -> ZipResult<Vec<PathBuf>> {
    let file = File::open(archive)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut written = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let outpath = match entry.enclosed_name() {
            Some(path) => dest.join(path),
            None => continue,
        };

        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
        } else {
            if let Some(p) = outpath.parent() {
                fs::create_dir_all(p)?;
            }
            let mut outfile = File::create(&outpath)?;
            io::copy(&mut entry, &mut outfile)?;
            written.push(outpath);
        }
    }
    Ok(written)
}

#[cfg(test)]
pub(crate) fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    let mut writer = zip::ZipWriter::new(io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
