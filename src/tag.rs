use std::path::Path;

use lofty::config::WriteOptions;
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::{Tag, TagType};

use crate::error::{AppError, Result};
use crate::format::{parse_position, Field};

/// Read, clear, fill and persist the tag container of one file.
pub trait TagStore {
    type Tags;

    /// Existing tags, or `None` when the file carries no container yet.
    fn read(&self, path: &Path) -> Result<Option<Self::Tags>>;
    fn create(&self, path: &Path) -> Self::Tags;
    fn clear(&self, tags: &mut Self::Tags);
    fn set(&self, tags: &mut Self::Tags, field: Field, value: &str) -> Result<()>;
    fn save(&self, tags: &Self::Tags, path: &Path) -> Result<()>;
}

/// ID3v2 tags through lofty.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyStore;

impl TagStore for LoftyStore {
    type Tags = Tag;

    fn read(&self, path: &Path) -> Result<Option<Tag>> {
        let tagged_file = Probe::open(path)?.guess_file_type()?.read()?;
        Ok(tagged_file.tag(TagType::Id3v2).cloned())
    }

    fn create(&self, _path: &Path) -> Tag {
        Tag::new(TagType::Id3v2)
    }

    fn clear(&self, tags: &mut Tag) {
        tags.clear();
    }

    fn set(&self, tags: &mut Tag, field: Field, value: &str) -> Result<()> {
        let value = value.to_owned();
        match field {
            Field::Title => tags.set_title(value),
            Field::Artist => tags.set_artist(value),
            Field::Album => tags.set_album(value),
            Field::Genre => tags.set_genre(value),
            Field::AlbumArtist => {
                tags.insert_text(ItemKey::AlbumArtist, value);
            }
            Field::Composer => {
                tags.insert_text(ItemKey::Composer, value);
            }
            Field::Date => {
                tags.insert_text(ItemKey::RecordingDate, value);
            }
            Field::TrackNumber => {
                let (track, total) = position(field, &value)?;
                tags.set_track(track);
                if let Some(total) = total {
                    tags.set_track_total(total);
                }
            }
            Field::DiscNumber => {
                let (disk, total) = position(field, &value)?;
                tags.set_disk(disk);
                if let Some(total) = total {
                    tags.set_disk_total(total);
                }
            }
            Field::Length => return Err(AppError::UnknownField(field.name().to_owned())),
        }
        Ok(())
    }

    fn save(&self, tags: &Tag, path: &Path) -> Result<()> {
        tags.save_to_path(path, WriteOptions::default())
            .map_err(|e| AppError::WriteTagError(e.to_string()))?;
        // A stale ID3v1 footer would otherwise keep the old values visible.
        TagType::Id3v1
            .remove_from_path(path)
            .map_err(|e| AppError::WriteTagError(e.to_string()))
    }
}

fn position(field: Field, value: &str) -> Result<(u32, Option<u32>)> {
    parse_position(value).ok_or_else(|| AppError::InvalidValue {
        field: field.name().to_owned(),
        value: value.to_owned(),
    })
}
