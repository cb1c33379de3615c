use blobmirror_build::{
    explore, prepare_build_area, BlobKind, GroupLevels, IgnoreSet, SkipKind,
};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Fixture {
    _temp: TempDir,
    root: PathBuf,
    build: PathBuf,
}

fn fixture(files: &[(&str, &str)]) -> Fixture {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("data");
    let build = temp.path().join("build");
    fs::create_dir_all(&root).unwrap();
    for (path, content) in files {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    prepare_build_area(&build).unwrap();
    Fixture {
        _temp: temp,
        root,
        build,
    }
}

/// Every file in the build area, relative to it.
fn build_listing(build: &Path) -> Vec<String> {
    let mut out = Vec::new();
    collect(build, build, &mut out);
    out.sort();
    out
}

fn collect(base: &Path, dir: &Path, out: &mut Vec<String>) {
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect(base, &path, out);
        } else {
            out.push(path.strip_prefix(base).unwrap().to_string_lossy().to_string());
        }
    }
}

/// Entry name -> content for every regular file in a blob.
fn blob_contents(blob: &Path) -> BTreeMap<String, String> {
    let file = File::open(blob).unwrap();
    let mut archive = tar::Archive::new(bzip2::read::BzDecoder::new(file));
    let mut contents = BTreeMap::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = entry.path().unwrap().to_string_lossy().to_string();
        let mut text = String::new();
        entry.read_to_string(&mut text).unwrap();
        contents.insert(name, text);
    }
    contents
}

#[test]
fn test_group_budget_one() {
    let fx = fixture(&[
        ("projects/a/x.txt", "x"),
        ("projects/b/y.txt", "y"),
        ("other/z.txt", "z"),
    ]);
    let levels: GroupLevels = [("projects", 1)].into_iter().collect();

    let manifest = explore(&fx.root, &fx.build, &levels, &IgnoreSet::new()).unwrap();

    assert!(fx.build.join("projects").is_dir());
    assert_eq!(
        build_listing(&fx.build),
        vec![
            "other.tar.bz2",
            "projects/a.tar.bz2",
            "projects/b.tar.bz2",
        ]
    );
    assert_eq!(manifest.blob_count(), 3);
    assert_eq!(manifest.groups, vec![fx.build.join("projects")]);

    // entries keep the full root-relative path
    let a = blob_contents(&fx.build.join("projects/a.tar.bz2"));
    assert_eq!(a.keys().collect::<Vec<_>>(), vec!["projects/a/x.txt"]);
    let other = blob_contents(&fx.build.join("other.tar.bz2"));
    assert_eq!(other.get("other/z.txt").map(String::as_str), Some("z"));
}

#[test]
fn test_group_budget_two() {
    let fx = fixture(&[
        ("projects/a/sub/deep.txt", "deep"),
        ("projects/a/top.txt", "top"),
        ("projects/readme", "hi"),
    ]);
    let levels: GroupLevels = [("projects", 2)].into_iter().collect();

    explore(&fx.root, &fx.build, &levels, &IgnoreSet::new()).unwrap();

    assert_eq!(
        build_listing(&fx.build),
        vec![
            "projects/_packed_files.tar.bz2",
            "projects/a/_packed_files.tar.bz2",
            "projects/a/sub.tar.bz2",
        ]
    );
    let loose = blob_contents(&fx.build.join("projects/a/_packed_files.tar.bz2"));
    assert_eq!(loose.keys().collect::<Vec<_>>(), vec!["projects/a/top.txt"]);
    let sub = blob_contents(&fx.build.join("projects/a/sub.tar.bz2"));
    assert_eq!(
        sub.keys().collect::<Vec<_>>(),
        vec!["projects/a/sub/deep.txt"]
    );
}

#[test]
fn test_ungrouped_root_level() {
    let fx = fixture(&[("one.txt", "1"), ("two.txt", "2"), ("docs/d.txt", "d")]);

    let manifest = explore(&fx.root, &fx.build, &GroupLevels::new(), &IgnoreSet::new()).unwrap();

    assert_eq!(
        build_listing(&fx.build),
        vec!["_packed_files.tar.bz2", "docs.tar.bz2"]
    );
    let loose = manifest
        .blob_for(Path::new(""), BlobKind::Loose)
        .expect("loose blob at root level");
    assert_eq!(loose.entries, 2);
    assert_eq!(
        blob_contents(&loose.path).keys().collect::<Vec<_>>(),
        vec!["one.txt", "two.txt"]
    );
}

#[test]
fn test_ignored_directory_never_archived() {
    let fx = fixture(&[
        ("secrets/key.pem", "k"),
        ("secrets/inner/more", "m"),
        ("home/keep.txt", "keep"),
        ("home/secrets/still.txt", "nested dir of the same name is kept"),
        ("home/cache/big.bin", "cache"),
    ]);
    let ignore: IgnoreSet = [fx.root.join("secrets"), fx.root.join("home/cache")]
        .into_iter()
        .collect();

    let manifest = explore(&fx.root, &fx.build, &GroupLevels::new(), &ignore).unwrap();

    assert_eq!(build_listing(&fx.build), vec!["home.tar.bz2"]);
    let home = blob_contents(&fx.build.join("home.tar.bz2"));
    assert_eq!(
        home.keys().collect::<Vec<_>>(),
        vec!["home/keep.txt", "home/secrets/still.txt"]
    );
    for blob in &manifest.blobs {
        for name in blob_contents(&blob.path).keys() {
            assert!(!name.starts_with("secrets/"));
            assert!(!name.starts_with("home/cache"));
        }
    }
}

#[test]
fn test_ignored_file_in_loose_level() {
    let fx = fixture(&[("keep.txt", "k"), ("skip.txt", "s")]);
    let ignore: IgnoreSet = [fx.root.join("skip.txt")].into_iter().collect();

    explore(&fx.root, &fx.build, &GroupLevels::new(), &ignore).unwrap();

    let loose = blob_contents(&fx.build.join("_packed_files.tar.bz2"));
    assert_eq!(loose.keys().collect::<Vec<_>>(), vec!["keep.txt"]);
}

#[test]
fn test_sanitized_names_collide() {
    let fx = fixture(&[("a:/first.txt", "1"), ("a%3A/second.txt", "2")]);

    let manifest = explore(&fx.root, &fx.build, &GroupLevels::new(), &IgnoreSet::new()).unwrap();

    assert_eq!(
        build_listing(&fx.build),
        vec!["a%3A-1.tar.bz2", "a%3A.tar.bz2"]
    );
    // byte order puts "a%3A" before "a:", so it gets the plain name
    let plain = blob_contents(&fx.build.join("a%3A.tar.bz2"));
    assert!(plain.contains_key("a%3A/second.txt"));
    let suffixed = blob_contents(&fx.build.join("a%3A-1.tar.bz2"));
    assert!(suffixed.contains_key("a:/first.txt"));
    assert_eq!(manifest.blob_count(), 2);
}

#[test]
fn test_grouped_dir_name_is_sanitized() {
    let fx = fixture(&[("what?/inner/f.txt", "f")]);
    let levels: GroupLevels = [("what?", 1)].into_iter().collect();

    explore(&fx.root, &fx.build, &levels, &IgnoreSet::new()).unwrap();

    assert_eq!(build_listing(&fx.build), vec!["what%3F/inner.tar.bz2"]);
}

#[test]
fn test_round_trip_extraction() {
    let fx = fixture(&[
        ("photos/2019/a.jpg", "jpeg bytes"),
        ("photos/2020/b.jpg", "more jpeg bytes"),
        ("photos/index.html", "<html>"),
        ("music/song.flac", "flac"),
        ("todo.md", "- test"),
    ]);
    let levels: GroupLevels = [("photos", 1)].into_iter().collect();
    let manifest = explore(&fx.root, &fx.build, &levels, &IgnoreSet::new()).unwrap();

    let restore = fx._temp.path().join("restore");
    fs::create_dir_all(&restore).unwrap();
    for blob in &manifest.blobs {
        let file = File::open(&blob.path).unwrap();
        tar::Archive::new(bzip2::read::BzDecoder::new(file))
            .unpack(&restore)
            .unwrap();
    }

    for relative in [
        "photos/2019/a.jpg",
        "photos/2020/b.jpg",
        "photos/index.html",
        "music/song.flac",
        "todo.md",
    ] {
        assert_eq!(
            fs::read(restore.join(relative)).unwrap(),
            fs::read(fx.root.join(relative)).unwrap(),
            "{relative} differs after extraction"
        );
    }
}

#[cfg(unix)]
#[test]
fn test_symlink_stored_as_link() {
    let fx = fixture(&[("docs/real.txt", "real")]);
    std::os::unix::fs::symlink("real.txt", fx.root.join("docs/link.txt")).unwrap();

    explore(&fx.root, &fx.build, &GroupLevels::new(), &IgnoreSet::new()).unwrap();

    let file = File::open(fx.build.join("docs.tar.bz2")).unwrap();
    let mut archive = tar::Archive::new(bzip2::read::BzDecoder::new(file));
    let link = archive
        .entries()
        .unwrap()
        .map(|e| e.unwrap())
        .find(|e| e.path().unwrap() == Path::new("docs/link.txt"))
        .expect("link entry");
    assert!(link.header().entry_type().is_symlink());
    assert_eq!(
        link.link_name().unwrap().unwrap().into_owned(),
        PathBuf::from("real.txt")
    );
}

#[cfg(unix)]
#[test]
fn test_unreadable_file_is_soft_skip() {
    use std::os::unix::fs::PermissionsExt;

    let fx = fixture(&[("docs/open.txt", "open"), ("docs/locked.txt", "locked")]);
    let locked = fx.root.join("docs/locked.txt");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    if File::open(&locked).is_ok() {
        // running with privileges that bypass permissions
        return;
    }

    let manifest = explore(&fx.root, &fx.build, &GroupLevels::new(), &IgnoreSet::new()).unwrap();

    let docs = blob_contents(&fx.build.join("docs.tar.bz2"));
    assert_eq!(docs.keys().collect::<Vec<_>>(), vec!["docs/open.txt"]);
    assert_eq!(manifest.warnings.len(), 1);
    assert_eq!(manifest.warnings[0].path, locked);
}

#[cfg(unix)]
#[test]
fn test_sockets_are_soft_skips() {
    use std::os::unix::net::UnixListener;

    let fx = fixture(&[("run/readme.txt", "read me"), ("notes.txt", "notes")]);
    let _in_leaf = UnixListener::bind(fx.root.join("run/agent.sock")).unwrap();
    let _loose = UnixListener::bind(fx.root.join("top.sock")).unwrap();

    let manifest = explore(&fx.root, &fx.build, &GroupLevels::new(), &IgnoreSet::new()).unwrap();

    let run = blob_contents(&fx.build.join("run.tar.bz2"));
    assert_eq!(run.keys().collect::<Vec<_>>(), vec!["run/readme.txt"]);
    let packed = blob_contents(&fx.build.join("_packed_files.tar.bz2"));
    assert_eq!(packed.keys().collect::<Vec<_>>(), vec!["notes.txt"]);

    let mut skipped: Vec<_> = manifest.warnings.iter().map(|w| w.path.clone()).collect();
    skipped.sort();
    assert_eq!(
        skipped,
        vec![fx.root.join("run/agent.sock"), fx.root.join("top.sock")]
    );
    assert!(manifest
        .warnings
        .iter()
        .all(|w| w.kind == SkipKind::Unsupported));
}

#[test]
fn test_rebuild_is_deterministic() {
    let fx = fixture(&[("b/1", "1"), ("a/2", "2"), ("c", "3")]);
    let first = explore(&fx.root, &fx.build, &GroupLevels::new(), &IgnoreSet::new()).unwrap();
    let first_names: Vec<_> = first.blobs.iter().map(|b| b.file_name().to_string()).collect();

    prepare_build_area(&fx.build).unwrap();
    let second = explore(&fx.root, &fx.build, &GroupLevels::new(), &IgnoreSet::new()).unwrap();
    let second_names: Vec<_> = second.blobs.iter().map(|b| b.file_name().to_string()).collect();

    assert_eq!(first_names, vec!["a.tar.bz2", "b.tar.bz2", "_packed_files.tar.bz2"]);
    assert_eq!(first_names, second_names);
}
