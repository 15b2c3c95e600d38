// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::error::{DistError, Result};
use codechain::config::{Config, CODECHAIN_DIR, HASHCHAIN_FILE, PATCHES_DIR};
use codechain::hash::Hash;
use codechain::hashchain::{self, ChainError, ChainState, HashChain};
use codechain::lockfile::LockFile;
use codechain::sync::patch_path;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;
use tar::{Archive, Builder, EntryType, Header, HeaderMode};

/// Writes the hashchain of `config` and the patches between its published
/// trees to a gzipped tar at `out`. Returns the number of patches written.
pub fn create(out: &Path, config: &Config) -> Result<usize> {
    let chain_path = config.hashchain_file();
    let (_, state) = hashchain::verify_file(&chain_path)?;
    let chain = fs::read(&chain_path)?;

    // every published tree but the last is the start of a patch
    let hashes = state.tree_hashes();
    let starts: BTreeSet<Hash> = hashes[..hashes.len() - 1].iter().copied().collect();

    let file = File::create(out)?;
    let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
    builder.mode(HeaderMode::Deterministic);

    append_dir(&mut builder, CODECHAIN_DIR)?;
    append_file(&mut builder, &format!("{CODECHAIN_DIR}/{HASHCHAIN_FILE}"), &chain)?;
    append_dir(&mut builder, &format!("{CODECHAIN_DIR}/{PATCHES_DIR}"))?;
    for start in &starts {
        let path = patch_path(&config.patch_dir(), start);
        let patch = fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => DistError::MissingPatch(start.to_hex()),
            _ => DistError::IoError(e),
        })?;
        append_file(
            &mut builder,
            &format!("{CODECHAIN_DIR}/{PATCHES_DIR}/{}", start.to_hex()),
            &patch,
        )?;
    }

    let file = builder.into_inner()?.finish()?;
    file.sync_all()?;
    tracing::info!(
        "Wrote distribution {:?} ({} lines, {} patches)",
        out,
        state.len(),
        starts.len()
    );
    Ok(starts.len())
}

fn append_dir<W: Write>(builder: &mut Builder<W>, path: &str) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Directory);
    header.set_mode(0o755);
    header.set_mtime(0);
    header.set_size(0);
    builder.append_data(&mut header, path, io::empty())
}

fn append_file<W: Write>(builder: &mut Builder<W>, path: &str, data: &[u8]) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_size(data.len() as u64);
    builder.append_data(&mut header, path, data)
}

#[derive(Debug, Default)]
struct Contents {
    hashchain: Option<Vec<u8>>,
    patches: BTreeMap<String, Vec<u8>>,
}

fn read_archive<R: Read>(reader: R) -> Result<Contents> {
    let chain_name = format!("{CODECHAIN_DIR}/{HASHCHAIN_FILE}");
    let patches_dir = format!("{CODECHAIN_DIR}/{PATCHES_DIR}");
    let patch_prefix = format!("{patches_dir}/");

    let mut contents = Contents::default();
    let mut archive = Archive::new(reader);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().trim_end_matches('/').to_string();
        let kind = entry.header().entry_type();

        if kind.is_dir() && (name == CODECHAIN_DIR || name == patches_dir) {
            continue;
        }
        if !kind.is_file() {
            return Err(DistError::UnknownFileInArchive(name));
        }

        let mut data = Vec::new();
        if name == chain_name {
            entry.read_to_end(&mut data)?;
            contents.hashchain = Some(data);
        } else if let Some(hex) = name
            .strip_prefix(&patch_prefix)
            .filter(|hex| Hash::from_hex(hex).is_ok())
        {
            entry.read_to_end(&mut data)?;
            contents.patches.insert(hex.to_string(), data);
        } else {
            return Err(DistError::UnknownFileInArchive(name));
        }
    }
    Ok(contents)
}

/// Applies the distribution at `archive` to the project of `config`.
///
/// The archived hashchain must extend the local one, if any. Patches are then
/// written to the patch directory; one that already exists must match byte
/// for byte. Finally the archived hashchain is merged into the local one, or
/// becomes it when there is none. Returns the number of chain lines added.
pub fn apply(archive: &Path, config: &Config) -> Result<usize> {
    let contents = read_archive(GzDecoder::new(File::open(archive)?))?;
    let chain = contents.hashchain.ok_or(DistError::MissingHashchain)?;
    let text = String::from_utf8(chain).map_err(|_| DistError::NotUtf8)?;
    let links = hashchain::parse_links(&text)?;
    if links.is_empty() {
        return Err(DistError::EmptyHashchain);
    }
    ChainState::replay(&links)?;

    // a diverging chain must fail before any patch reaches the patch directory
    let chain_path = config.hashchain_file();
    let mut local = if chain_path.exists() {
        let local = HashChain::open(&chain_path)?;
        match hashchain::merge::extension(local.links(), &links) {
            Ok(_) | Err(ChainError::NothingToMerge) => {}
            Err(e) => return Err(e.into()),
        }
        Some(local)
    } else {
        None
    };

    let patch_dir = config.patch_dir();
    fs::create_dir_all(&patch_dir)?;
    for (hex, data) in &contents.patches {
        let path = patch_dir.join(hex);
        match fs::read(&path) {
            Ok(existing) if existing == *data => continue,
            Ok(_) => return Err(DistError::PatchConflict(hex.clone())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        file.write_all(data)?;
        file.sync_all()?;
        tracing::debug!("Wrote patch {:?}", path);
    }

    let added = if let Some(local) = local.as_mut() {
        match local.merge(&links) {
            Ok(added) => added,
            Err(ChainError::NothingToMerge) => 0,
            Err(e) => return Err(e.into()),
        }
    } else {
        let _lock = LockFile::acquire(&chain_path)?;
        let mut file = OpenOptions::new().write(true).create_new(true).open(&chain_path)?;
        file.write_all(text.as_bytes())?;
        file.sync_all()?;
        links.len()
    };

    tracing::info!(
        "Applied distribution {:?}: {} patches, {} new lines",
        archive,
        contents.patches.len(),
        added
    );
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use codechain::hashchain::keys;
    use codechain::{patchfile, sync, tree};
    use ed25519_dalek::SigningKey;
    use tempfile::{tempdir, TempDir};

    struct Project {
        dir: TempDir,
        config: Config,
        key: SigningKey,
        versions: Vec<TempDir>,
    }

    impl Project {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let config = Config::for_root(dir.path());
            fs::create_dir_all(config.patch_dir()).unwrap();
            let key = keys::generate_key();
            HashChain::start(&config.hashchain_file(), &key, "maintainer").unwrap();
            Project {
                dir,
                config,
                key,
                versions: vec![tempdir().unwrap()],
            }
        }

        /// Publishes a tree holding a single `main.c` with `body`.
        fn publish(&mut self, body: &str) -> Hash {
            let next = tempdir().unwrap();
            fs::write(next.path().join("main.c"), body).unwrap();
            let previous = self.versions[self.versions.len() - 1].path();
            let from = tree::hash(previous, &[]).unwrap();
            let to = tree::hash(next.path(), &[]).unwrap();

            let patch = patch_path(&self.config.patch_dir(), &from);
            patchfile::diff_to_file(&patch, 2, previous, next.path(), &[]).unwrap();
            let mut chain = HashChain::open(&self.config.hashchain_file()).unwrap();
            chain.source(to, &self.key, "release").unwrap();
            self.versions.push(next);
            to
        }

        fn archive(&self) -> std::path::PathBuf {
            let out = self.dir.path().join("dist.tar.gz");
            create(&out, &self.config).unwrap();
            out
        }
    }

    #[test]
    fn test_create_and_apply() {
        let mut project = Project::new();
        project.publish("int main(void) { return 0; }\n");
        let latest = project.publish("int main(void) { return 1; }\n");
        let out = project.archive();

        let clone = tempdir().unwrap();
        let config = Config::for_root(clone.path());
        assert_eq!(apply(&out, &config).unwrap(), 3);
        assert_eq!(
            fs::read(config.hashchain_file()).unwrap(),
            fs::read(project.config.hashchain_file()).unwrap()
        );

        // the clone can rebuild the latest tree from its own patches
        let (_, state) = hashchain::verify_file(&config.hashchain_file()).unwrap();
        let work = tempdir().unwrap();
        sync::sync(work.path(), &latest, &config.patch_dir(), &state.tree_hashes(), &[], false)
            .unwrap();
        assert_eq!(tree::hash(work.path(), &[]).unwrap(), latest);

        // applying again changes nothing; a newer archive adds one line
        assert_eq!(apply(&out, &config).unwrap(), 0);
        project.publish("int main(void) { return 2; }\n");
        let out = project.archive();
        assert_eq!(apply(&out, &config).unwrap(), 1);
    }

    #[test]
    fn test_missing_patch() {
        let mut project = Project::new();
        let first = project.publish("a\n");
        project.publish("b\n");
        fs::remove_file(patch_path(&project.config.patch_dir(), &first)).unwrap();
        assert!(matches!(
            create(&project.dir.path().join("dist.tar.gz"), &project.config),
            Err(DistError::MissingPatch(hex)) if hex == first.to_hex()
        ));
    }

    #[test]
    fn test_patch_conflict() {
        let mut project = Project::new();
        project.publish("a\n");
        let out = project.archive();

        let clone = tempdir().unwrap();
        let config = Config::for_root(clone.path());
        fs::create_dir_all(config.patch_dir()).unwrap();
        let empty = codechain::EMPTY_HASH;
        fs::write(patch_path(&config.patch_dir(), &empty), "something else\n").unwrap();

        assert!(matches!(
            apply(&out, &config),
            Err(DistError::PatchConflict(hex)) if hex == empty.to_hex()
        ));
        assert!(!config.hashchain_file().exists());
    }

    #[test]
    fn test_diverging_chain_writes_no_patches() {
        let mut project = Project::new();
        project.publish("a\n");
        let clone = tempdir().unwrap();
        let config = Config::for_root(clone.path());
        assert_eq!(apply(&project.archive(), &config).unwrap(), 2);

        // same first tree under another key
        let mut foreign = Project::new();
        let shared = foreign.publish("a\n");
        foreign.publish("junk\n");
        let before = fs::read(config.hashchain_file()).unwrap();
        assert!(matches!(
            apply(&foreign.archive(), &config),
            Err(DistError::Chain(ChainError::CannotMerge { line: 0 }))
        ));
        assert!(!patch_path(&config.patch_dir(), &shared).exists());
        assert_eq!(fs::read(config.hashchain_file()).unwrap(), before);

        // the real next release still applies
        project.publish("b\n");
        assert_eq!(apply(&project.archive(), &config).unwrap(), 1);
        assert!(patch_path(&config.patch_dir(), &shared).exists());
    }

    fn raw_archive(path: &Path, files: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
        append_dir(&mut builder, CODECHAIN_DIR).unwrap();
        for (name, data) in files {
            append_file(&mut builder, name, data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_rejects_foreign_archives() {
        let dir = tempdir().unwrap();
        let config = Config::for_root(dir.path().join("project"));
        let out = dir.path().join("dist.tar.gz");

        raw_archive(&out, &[("README", &b"hello\n"[..])]);
        assert!(matches!(
            apply(&out, &config),
            Err(DistError::UnknownFileInArchive(name)) if name == "README"
        ));

        raw_archive(&out, &[(".codechain/patches/not-a-hash", &b"x\n"[..])]);
        assert!(matches!(
            apply(&out, &config),
            Err(DistError::UnknownFileInArchive(_))
        ));

        let name = format!(".codechain/patches/{}", codechain::EMPTY_HASH);
        raw_archive(&out, &[(name.as_str(), &b"x\n"[..])]);
        assert!(matches!(apply(&out, &config), Err(DistError::MissingHashchain)));

        raw_archive(&out, &[(".codechain/hashchain", &b""[..])]);
        assert!(matches!(apply(&out, &config), Err(DistError::EmptyHashchain)));
    }
}
