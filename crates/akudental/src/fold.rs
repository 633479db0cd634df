use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{self, Display};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::coco::RawImage;
use crate::error::{DatasetResult, SchemaError};

/// A 1-based fold number.
pub(crate) type FoldId = u8;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub(crate) const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];
}

impl Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Train => write!(f, "train"),
            Self::Val => write!(f, "val"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// Contents of a split file: `fold_<k>` (0-based) to the file names
/// of each split.
pub(crate) type SplitInfo = BTreeMap<String, BTreeMap<Split, Vec<String>>>;

/// Reads a split file from disk.
pub(crate) fn read_split_info<P: AsRef<Path>>(
    path: P,
) -> DatasetResult<SplitInfo> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Parses a split file key (`fold_0`) into a 1-based fold number.
fn parse_fold_key(key: &str, num_folds: FoldId) -> Result<FoldId, SchemaError> {
    let index = key
        .strip_prefix("fold_")
        .and_then(|k| k.parse::<u16>().ok())
        .ok_or_else(|| {
            SchemaError::Fold(format!("invalid split key '{key}'"))
        })?;

    if index >= num_folds as u16 {
        return Err(SchemaError::Fold(format!(
            "split key '{key}' exceeds the number of folds ({num_folds})"
        )));
    }

    Ok(index as FoldId + 1)
}

/// Assignment of every image to exactly one fold.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Folds {
    num_folds: FoldId,
    assignment: BTreeMap<u64, FoldId>,
    splits: Option<BTreeMap<FoldId, BTreeMap<Split, BTreeSet<u64>>>>,
}

impl Folds {
    /// Builds the fold partition from the `fold` field of the images
    /// and, if given, from the test splits of a split file.
    ///
    /// This function fails, if an image is left without a fold, is
    /// assigned to more than one fold or to a fold outside of
    /// `1..=num_folds`, or if the split file names an unknown image.
    pub(crate) fn partition(
        images: &[RawImage],
        num_folds: FoldId,
        split_info: Option<&SplitInfo>,
    ) -> Result<Self, SchemaError> {
        if num_folds == 0 {
            return Err(SchemaError::Fold(
                "number of folds must be positive".into(),
            ));
        }

        let mut assignment = BTreeMap::new();
        for image in images.iter() {
            if let Some(fold) = image.fold {
                if fold < 1 || fold > num_folds as i64 {
                    return Err(SchemaError::Fold(format!(
                        "image {} has fold {fold}, expected 1..={num_folds}",
                        image.id
                    )));
                }

                assignment.insert(image.id, fold as FoldId);
            }
        }

        let splits = match split_info {
            Some(info) => Some(Self::resolve_splits(
                images,
                num_folds,
                info,
                &mut assignment,
            )?),
            None => None,
        };

        if let Some(image) =
            images.iter().find(|image| !assignment.contains_key(&image.id))
        {
            return Err(SchemaError::Fold(format!(
                "image {} ('{}') is not assigned to any fold",
                image.id, image.file_name
            )));
        }

        Ok(Self {
            num_folds,
            assignment,
            splits,
        })
    }

    fn resolve_splits(
        images: &[RawImage],
        num_folds: FoldId,
        info: &SplitInfo,
        assignment: &mut BTreeMap<u64, FoldId>,
    ) -> Result<BTreeMap<FoldId, BTreeMap<Split, BTreeSet<u64>>>, SchemaError>
    {
        let ids: HashMap<&str, u64> = images
            .iter()
            .map(|image| (image.file_name.as_str(), image.id))
            .collect();

        let mut from_tests: BTreeMap<u64, FoldId> = BTreeMap::new();
        let mut result = BTreeMap::new();

        for (key, splits) in info.iter() {
            let fold = parse_fold_key(key, num_folds)?;
            let mut seen: HashMap<u64, Split> = HashMap::new();
            let mut sets: BTreeMap<Split, BTreeSet<u64>> = BTreeMap::new();

            for (split, file_names) in splits.iter() {
                for file_name in file_names.iter() {
                    let Some(id) = ids.get(file_name.as_str()).copied()
                    else {
                        return Err(SchemaError::Fold(format!(
                            "{key}/{split} references unknown image \
                            '{file_name}'"
                        )));
                    };

                    if let Some(other) = seen.insert(id, *split) {
                        if other != *split {
                            return Err(SchemaError::Fold(format!(
                                "image '{file_name}' is in both {other} \
                                and {split} of {key}"
                            )));
                        }
                    }

                    if *split == Split::Test {
                        if let Some(prev) = from_tests.insert(id, fold) {
                            if prev != fold {
                                return Err(SchemaError::Fold(format!(
                                    "image '{file_name}' is test data \
                                    in folds {prev} and {fold}"
                                )));
                            }
                        }
                    }

                    sets.entry(*split).or_default().insert(id);
                }
            }

            result.insert(fold, sets);
        }

        for (id, fold) in from_tests.into_iter() {
            match assignment.get(&id) {
                Some(declared) if *declared != fold => {
                    return Err(SchemaError::Fold(format!(
                        "image {id} declares fold {declared}, but the \
                        split file assigns fold {fold}"
                    )));
                }
                _ => {
                    assignment.insert(id, fold);
                }
            }
        }

        Ok(result)
    }

    #[inline]
    pub(crate) fn num_folds(&self) -> FoldId {
        self.num_folds
    }

    /// Returns the fold of an image.
    #[inline]
    pub(crate) fn fold_of(&self, image_id: u64) -> Option<FoldId> {
        self.assignment.get(&image_id).copied()
    }

    /// Returns the ids of all images of the given fold.
    pub(crate) fn members(&self, fold: FoldId) -> BTreeSet<u64> {
        self.assignment
            .iter()
            .filter(|(_, f)| **f == fold)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Returns the train/val/test image sets for a fold. If a split
    /// file was given, its splits are used. Otherwise the fold itself
    /// is the test set, the following fold (cyclic) the validation
    /// set, and all remaining folds the training set.
    pub(crate) fn splits(
        &self,
        fold: FoldId,
    ) -> BTreeMap<Split, BTreeSet<u64>> {
        if let Some(ref splits) = self.splits {
            let mut result = splits.get(&fold).cloned().unwrap_or_default();
            for split in Split::ALL {
                result.entry(split).or_default();
            }

            return result;
        }

        let val = fold % self.num_folds + 1;
        let mut result: BTreeMap<Split, BTreeSet<u64>> =
            Split::ALL.into_iter().map(|s| (s, BTreeSet::new())).collect();

        for (id, f) in self.assignment.iter() {
            let split = if *f == fold {
                Split::Test
            } else if *f == val {
                Split::Val
            } else {
                Split::Train
            };

            result.entry(split).or_default().insert(*id);
        }

        result
    }
}
