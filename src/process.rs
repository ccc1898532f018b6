use std::ffi::OsStr;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::format::{Field, FormatSpec};
use crate::normalize::Normalizer;
use crate::tag::TagStore;

pub const TARGET_EXTENSION: &str = "mp3";

#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    pub normalizer: Normalizer,
    pub dry_run: bool,
    pub preserve_mtime: bool,
}

#[derive(Debug)]
pub enum Outcome {
    /// Tags were written; `path` is where the file lives after renaming.
    Processed { path: PathBuf },
    SkippedWrongExtension,
    SkippedNotMatched { name: String, format: String },
    SkippedInvalidFormatter(Field),
    Failed(AppError),
}

impl Outcome {
    pub fn is_processed(&self) -> bool {
        matches!(self, Outcome::Processed { .. })
    }

    /// Why the file was not processed.
    pub fn reason(&self) -> Option<String> {
        match self {
            Outcome::Processed { .. } => None,
            Outcome::SkippedWrongExtension => {
                Some(format!("Not an .{} file", TARGET_EXTENSION))
            }
            Outcome::SkippedNotMatched { name, format } => Some(format!(
                "Filename '{}' does not match format '{}'",
                name, format
            )),
            Outcome::SkippedInvalidFormatter(field) => {
                Some(format!("Formatter '%{}%' not implemented", field))
            }
            Outcome::Failed(err) => Some(err.to_string()),
        }
    }
}

pub struct Processor<'a, S: TagStore> {
    format: &'a FormatSpec,
    store: S,
    options: Options,
}

impl<'a, S: TagStore> Processor<'a, S> {
    pub fn new(format: &'a FormatSpec, store: S, options: Options) -> Self {
        Processor {
            format,
            store,
            options,
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn process(&self, path: &Path) -> Outcome {
        match self.try_process(path) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!("{}: {}", path.display(), err);
                Outcome::Failed(err)
            }
        }
    }

    fn try_process(&self, path: &Path) -> Result<Outcome> {
        let extension = match path.extension().and_then(OsStr::to_str) {
            Some(ext) if ext.eq_ignore_ascii_case(TARGET_EXTENSION) => ext,
            _ => {
                debug!("skipping {}: wrong extension", path.display());
                return Ok(Outcome::SkippedWrongExtension);
            }
        };

        let stem = path
            .file_stem()
            .and_then(OsStr::to_str)
            .ok_or_else(|| AppError::PathError(path.to_path_buf()))?;
        let name = self.options.normalizer.apply(stem);
        let path = if name != stem {
            self.rename(path, &name, extension)?
        } else {
            path.to_path_buf()
        };

        let captures = match self.format.captures(&name) {
            Some(captures) => captures,
            None => {
                debug!("{} does not match {}", name, self.format);
                return Ok(Outcome::SkippedNotMatched {
                    name,
                    format: self.format.to_string(),
                });
            }
        };

        // Everything is checked up front so a bad value never leaves partial tags.
        for (field, value) in &captures {
            if !field.is_implemented() {
                warn!("{}: formatter '%{}%' not implemented", path.display(), field);
                return Ok(Outcome::SkippedInvalidFormatter(*field));
            }
            field.validate(value)?;
        }

        let mut tags = match self.store.read(&path)? {
            Some(mut tags) => {
                self.store.clear(&mut tags);
                tags
            }
            None => self.store.create(&path),
        };
        for (field, value) in &captures {
            self.store.set(&mut tags, *field, value)?;
        }

        if self.options.dry_run {
            info!("would tag {}: {:?}", path.display(), captures);
        } else {
            let mtime = fs::metadata(&path).map(|m| FileTime::from_last_modification_time(&m))?;
            self.store.save(&tags, &path)?;
            if self.options.preserve_mtime {
                filetime::set_file_mtime(&path, mtime)?;
            }
            info!("tagged {}", path.display());
        }

        Ok(Outcome::Processed { path })
    }

    fn rename(&self, path: &Path, name: &str, extension: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(std::path::is_separator) {
            return Err(AppError::PathError(PathBuf::from(name)));
        }
        let target = path.with_file_name(format!("{}.{}", name, extension));
        if target.exists() && !same_file(path, &target)? {
            return Err(AppError::RenameConflict(target));
        }

        if self.options.dry_run {
            info!("would rename {} -> {}", path.display(), target.display());
            // Nothing moved, so later steps keep working on the original file.
            return Ok(path.to_path_buf());
        }
        if target.exists() {
            fs::rename(path, &target)?;
        } else {
            move_no_clobber(path, &target)?;
        }
        info!("renamed {} -> {}", path.display(), target.display());
        Ok(target)
    }
}

// Case or normalization-insensitive filesystems report the new name as existing.
fn same_file(a: &Path, b: &Path) -> Result<bool> {
    Ok(fs::canonicalize(a)? == fs::canonicalize(b)?)
}

/// Move `from` to `to`, failing if `to` appears in the meantime. Linking
/// refuses an existing target; filesystems without hard links fall back to
/// a checked rename.
fn move_no_clobber(from: &Path, to: &Path) -> Result<()> {
    match fs::hard_link(from, to) {
        Ok(()) => Ok(fs::remove_file(from)?),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            Err(AppError::RenameConflict(to.to_path_buf()))
        }
        Err(e) => {
            debug!("hard link to {} failed ({}), renaming", to.display(), e);
            if to.exists() {
                return Err(AppError::RenameConflict(to.to_path_buf()));
            }
            Ok(fs::rename(from, to)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::time::{Duration, SystemTime};

    type Fields = Vec<(Field, String)>;

    #[derive(Default)]
    struct MemoryStore {
        files: RefCell<HashMap<PathBuf, Fields>>,
        saves: Cell<usize>,
    }

    impl MemoryStore {
        fn with(path: &Path, fields: Fields) -> MemoryStore {
            let store = MemoryStore::default();
            store.files.borrow_mut().insert(path.to_path_buf(), fields);
            store
        }

        fn get(&self, path: &Path) -> Option<Fields> {
            self.files.borrow().get(path).cloned()
        }
    }

    impl TagStore for MemoryStore {
        type Tags = Fields;

        fn read(&self, path: &Path) -> Result<Option<Fields>> {
            Ok(self.get(path))
        }

        fn create(&self, _path: &Path) -> Fields {
            Vec::new()
        }

        fn clear(&self, tags: &mut Fields) {
            tags.clear();
        }

        fn set(&self, tags: &mut Fields, field: Field, value: &str) -> Result<()> {
            tags.retain(|(f, _)| *f != field);
            tags.push((field, value.to_owned()));
            Ok(())
        }

        fn save(&self, tags: &Fields, path: &Path) -> Result<()> {
            self.saves.set(self.saves.get() + 1);
            self.files
                .borrow_mut()
                .insert(path.to_path_buf(), tags.clone());
            Ok(())
        }
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"").unwrap();
        path
    }

    fn fields(pairs: &[(Field, &str)]) -> Fields {
        pairs.iter().map(|(f, v)| (*f, v.to_string())).collect()
    }

    #[test]
    fn tags_matching_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "A - B.mp3");
        let format = FormatSpec::compile("%artist% - %title%").unwrap();
        let processor = Processor::new(&format, MemoryStore::default(), Options::default());

        let outcome = processor.process(&path);
        assert!(outcome.is_processed());
        assert_eq!(
            processor.store().get(&path),
            Some(fields(&[(Field::Artist, "A"), (Field::Title, "B")]))
        );
    }

    #[test]
    fn existing_tags_are_replaced_not_merged() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "A - B.mp3");
        let store = MemoryStore::with(
            &path,
            fields(&[(Field::Album, "Old"), (Field::Artist, "Old")]),
        );
        let format = FormatSpec::compile("%artist% - %title%").unwrap();
        let processor = Processor::new(&format, store, Options::default());

        processor.process(&path);
        assert_eq!(
            processor.store().get(&path),
            Some(fields(&[(Field::Artist, "A"), (Field::Title, "B")]))
        );
    }

    #[test]
    fn processing_twice_gives_same_tags() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "A - B.mp3");
        let format = FormatSpec::compile("%artist% - %title%").unwrap();
        let processor = Processor::new(&format, MemoryStore::default(), Options::default());

        processor.process(&path);
        let first = processor.store().get(&path);
        assert!(processor.process(&path).is_processed());
        assert_eq!(processor.store().get(&path), first);
        assert_eq!(processor.store().saves.get(), 2);
    }

    #[test]
    fn wrong_extension_is_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "張學友 - 愛.txt");
        let format = FormatSpec::compile("%artist% - %title%").unwrap();
        let processor = Processor::new(&format, MemoryStore::default(), Options::default());

        assert!(matches!(
            processor.process(&path),
            Outcome::SkippedWrongExtension
        ));
        assert!(path.exists());
        assert_eq!(processor.store().saves.get(), 0);
    }

    #[test]
    fn extension_check_ignores_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "A - B.MP3");
        let format = FormatSpec::compile("%artist% - %title%").unwrap();
        let processor = Processor::new(&format, MemoryStore::default(), Options::default());

        assert!(processor.process(&path).is_processed());
    }

    #[test]
    fn unmatched_name_is_skipped_with_reason() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "bad_name.mp3");
        let format = FormatSpec::compile("%artist% - %title%").unwrap();
        let processor = Processor::new(&format, MemoryStore::default(), Options::default());

        let outcome = processor.process(&path);
        let reason = outcome.reason().unwrap();
        assert!(reason.contains("bad_name"));
        assert!(reason.contains("%artist% - %title%"));
        assert_eq!(processor.store().saves.get(), 0);
    }

    #[test]
    fn renames_to_normalized_name_before_tagging() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "張學友 - 愛.mp3");
        let format = FormatSpec::compile("%artist% - %title%").unwrap();
        let processor = Processor::new(&format, MemoryStore::default(), Options::default());

        let renamed = dir.path().join("张学友 - 爱.mp3");
        match processor.process(&path) {
            Outcome::Processed { path } => assert_eq!(path, renamed),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(!path.exists());
        assert!(renamed.exists());
        assert_eq!(
            processor.store().get(&renamed),
            Some(fields(&[(Field::Artist, "张学友"), (Field::Title, "爱")]))
        );
    }

    #[test]
    fn rename_conflict_keeps_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "愛 - 愛.mp3");
        let existing = dir.path().join("爱 - 爱.mp3");
        fs::write(&existing, b"keep").unwrap();
        let format = FormatSpec::compile("%artist% - %title%").unwrap();
        let processor = Processor::new(&format, MemoryStore::default(), Options::default());

        let outcome = processor.process(&path);
        assert!(matches!(
            outcome,
            Outcome::Failed(AppError::RenameConflict(_))
        ));
        assert!(path.exists());
        assert_eq!(fs::read(&existing).unwrap(), b"keep");
        assert_eq!(processor.store().saves.get(), 0);
    }

    #[test]
    fn unimplemented_field_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "B (3:20).mp3");
        let store = MemoryStore::with(&path, fields(&[(Field::Title, "Old")]));
        let format = FormatSpec::compile("%title% (%length%)").unwrap();
        let processor = Processor::new(&format, store, Options::default());

        assert!(matches!(
            processor.process(&path),
            Outcome::SkippedInvalidFormatter(Field::Length)
        ));
        assert_eq!(
            processor.store().get(&path),
            Some(fields(&[(Field::Title, "Old")]))
        );
    }

    #[test]
    fn invalid_track_number_fails_without_saving() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "xx. Song.mp3");
        let format = FormatSpec::compile("%tracknumber%. %title%").unwrap();
        let processor = Processor::new(&format, MemoryStore::default(), Options::default());

        assert!(matches!(
            processor.process(&path),
            Outcome::Failed(AppError::InvalidValue { .. })
        ));
        assert_eq!(processor.store().saves.get(), 0);
    }

    #[test]
    fn dry_run_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "張學友 - 愛.mp3");
        let format = FormatSpec::compile("%artist% - %title%").unwrap();
        let options = Options {
            dry_run: true,
            ..Options::default()
        };
        let processor = Processor::new(&format, MemoryStore::default(), options);

        assert!(processor.process(&path).is_processed());
        assert!(path.exists());
        assert_eq!(processor.store().saves.get(), 0);
    }

    #[test]
    fn preserves_modification_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "A - B.mp3");
        let old = FileTime::from_system_time(SystemTime::now() - Duration::from_secs(86_400));
        filetime::set_file_mtime(&path, old).unwrap();
        let format = FormatSpec::compile("%artist% - %title%").unwrap();
        let options = Options {
            preserve_mtime: true,
            ..Options::default()
        };
        let processor = Processor::new(&format, MemoryStore::default(), options);

        assert!(processor.process(&path).is_processed());
        let meta = fs::metadata(&path).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta), old);
    }

    #[test]
    fn move_refuses_target_created_after_check() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("from.mp3");
        let to = dir.path().join("to.mp3");
        fs::write(&from, b"new").unwrap();
        fs::write(&to, b"old").unwrap();

        assert!(matches!(
            move_no_clobber(&from, &to),
            Err(AppError::RenameConflict(_))
        ));
        assert_eq!(fs::read(&from).unwrap(), b"new");
        assert_eq!(fs::read(&to).unwrap(), b"old");
    }

    #[test]
    fn move_keeps_contents_and_drops_source() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("from.mp3");
        let to = dir.path().join("to.mp3");
        fs::write(&from, b"audio").unwrap();

        move_no_clobber(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"audio");
    }
}
