//! Builders for package archives used by unit tests.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::Path;

/// A minimal package.json for `name@version`.
pub fn manifest(name: &str, version: &str) -> String {
    serde_json::json!({
        "name": name,
        "version": version,
        "description": format!("{name} test package"),
        "author": "tester",
        "main": "index.js",
        "dependencies": { "dep-a": "^1.0.0" },
        "repository": { "type": "git", "url": "https://example.com/repo.git" }
    })
    .to_string()
}

/// Write a gzipped tarball laid out the way `npm pack` does (`package/...`).
pub fn write_package_archive(path: &Path, manifest: &str, files: &[(&str, &str)]) {
    let file = File::create(path).unwrap();
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    append(&mut builder, "package/package.json", manifest.as_bytes());
    for (name, contents) in files {
        append(&mut builder, &format!("package/{name}"), contents.as_bytes());
    }

    builder.into_inner().unwrap().finish().unwrap();
}

fn append<W: std::io::Write>(builder: &mut tar::Builder<W>, path: &str, data: &[u8]) {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(1_700_000_000);
    header.set_cksum();
    builder.append_data(&mut header, path, data).unwrap();
}
