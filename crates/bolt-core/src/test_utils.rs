use std::{fs, io::Write, path::Path};

use flate2::{write::GzEncoder, Compression};

pub fn tarball(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *data).unwrap();
    }
    builder.into_inner().unwrap()
}

pub fn gzip_bytes(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Builds a `.bolt` package: an `ar` archive with a gzipped `control.tar`.
pub fn package_bytes(control: &str) -> Vec<u8> {
    let control_tar = gzip_bytes(&tarball(&[("./control", control.as_bytes())]));
    let data_tar = gzip_bytes(&tarball(&[("./usr/bin/hello", b"\x7fELF")]));

    let mut builder = ar::Builder::new(Vec::new());
    for (name, data) in [
        ("debian-binary", &b"2.0\n"[..]),
        ("control.tar.gz", &control_tar[..]),
        ("data.tar.gz", &data_tar[..]),
    ] {
        builder
            .append(&ar::Header::new(name.as_bytes().to_vec(), data.len() as u64), data)
            .unwrap();
    }
    builder.into_inner().unwrap()
}

/// Writes `<dir>/<name>_<version>_<arch>.bolt` and returns its path relative
/// to `repo`.
pub fn write_package(repo: &Path, subdir: &str, name: &str, version: &str) -> String {
    let dir = repo.join(subdir);
    fs::create_dir_all(&dir).unwrap();

    let file_name = format!("{name}_{version}_x86_64.bolt");
    let control = format!(
        "Package: {name}\nVersion: {version}\nArchitecture: x86_64\nDescription: test package\n long description line\n"
    );
    fs::write(dir.join(&file_name), package_bytes(&control)).unwrap();

    format!("{subdir}/{file_name}")
}
