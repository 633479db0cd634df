use std::collections::{BTreeMap, BTreeSet};
use std::io;

use clap::{Parser, ValueEnum};
use comfy_table::{presets, Row, Table};
use csv::WriterBuilder;

use crate::category::CategoryKind;
use crate::fold::FoldId;
use crate::prelude::*;

#[derive(Clone, Debug, PartialEq, Default, ValueEnum)]
pub(crate) enum GroupBy {
    #[default]
    Fold,
    Category,
}

/// Prints a summary of the dataset.
#[derive(Debug, Parser)]
pub(crate) struct Summary {
    /// Group the summary by fold (default) or by category.
    #[arg(long, default_value = "fold", value_name = "group")]
    by: GroupBy,

    /// If set, the summary will be written in CSV format to the
    /// standard output (stdout).
    #[arg(long)]
    csv: bool,

    #[command(flatten)]
    source: SourceArgs,
}

type Rows = (Vec<&'static str>, Vec<Vec<String>>);

fn by_fold(dataset: &Dataset) -> Rows {
    let folds = dataset.folds();
    let mut counts: BTreeMap<FoldId, (usize, usize, usize)> =
        (1..=folds.num_folds())
            .map(|fold| (fold, (folds.members(fold).len(), 0, 0)))
            .collect();

    for annotation in dataset.annotations().iter() {
        let Some(image) = dataset.image(annotation.image_id) else {
            continue;
        };

        let entry = counts.entry(image.fold).or_default();
        if annotation.kind.is_tooth() {
            entry.1 += 1;
        } else {
            entry.2 += 1;
        }
    }

    let rows = counts
        .into_iter()
        .map(|(fold, (images, teeth, restorations))| {
            vec![
                fold.to_string(),
                images.to_string(),
                teeth.to_string(),
                restorations.to_string(),
            ]
        })
        .collect();

    (vec!["fold", "images", "teeth", "restorations"], rows)
}

fn by_category(dataset: &Dataset) -> Rows {
    let mut counts: BTreeMap<u64, (usize, BTreeSet<u64>)> =
        BTreeMap::new();

    for annotation in dataset.annotations().iter() {
        let entry = counts.entry(annotation.category_id).or_default();
        entry.0 += 1;
        entry.1.insert(annotation.image_id);
    }

    let rows = dataset
        .categories()
        .iter()
        .map(|category| {
            let (annotations, images) = counts
                .get(&category.id)
                .map(|(n, images)| (*n, images.len()))
                .unwrap_or_default();

            let kind = match category.kind {
                CategoryKind::Tooth(_) => "tooth".to_string(),
                CategoryKind::Restoration(kind) => kind.to_string(),
            };

            vec![
                category.id.to_string(),
                category.name.clone(),
                kind,
                annotations.to_string(),
                images.to_string(),
            ]
        })
        .collect();

    (vec!["id", "name", "kind", "annotations", "images"], rows)
}

/// Counts the consistency violations with the same settings the
/// `validate` command uses.
fn violations_note(source: &Source, dataset: &Dataset) -> Option<String> {
    let count = source.consistency_check().check(dataset).len();
    if count == 0 {
        return None;
    }

    Some(format!(
        "note: found {count} consistency violations, see `akudental \
        validate`"
    ))
}

impl Summary {
    pub(crate) fn execute(self) -> DatasetResult<()> {
        let source = Source::resolve(&self.source)?;
        let dataset = source.load()?;

        let (header, rows) = match self.by {
            GroupBy::Fold => by_fold(&dataset),
            GroupBy::Category => by_category(&dataset),
        };

        if self.csv {
            let mut writer =
                WriterBuilder::new().from_writer(io::stdout().lock());
            writer.write_record(&header)?;
            for row in rows.iter() {
                writer.write_record(row)?;
            }

            writer.flush()?;
            return Ok(());
        }

        let mut table = Table::new();
        table.load_preset(presets::UTF8_FULL_CONDENSED);
        table.set_header(Row::from(header));
        for row in rows.into_iter() {
            table.add_row(row);
        }

        println!("{table}");

        if let Some(note) = violations_note(&source, &dataset) {
            eprintln!("{note}");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dataset::tests::{from_value, minimal};

    type TestResult = anyhow::Result<()>;

    #[test]
    fn summary_by_fold() -> TestResult {
        let mut doc = minimal();
        let mut restoration = doc["annotations"][0].clone();
        restoration["id"] = json!(2);
        restoration["category_id"] = json!(33);
        doc["annotations"].as_array_mut().unwrap().push(restoration);

        let (header, rows) = by_fold(&from_value(doc)?);
        assert_eq!(header.len(), 4);
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0], ["1", "1", "1", "1"]);
        assert_eq!(rows[1], ["2", "0", "0", "0"]);
        Ok(())
    }

    #[test]
    fn violations_note_uses_bbox_tolerance() -> TestResult {
        let mut doc = minimal();
        doc["annotations"][0]["bbox"] = json!([100, 120, 40, 80.5]);
        let dataset = from_value(doc)?;

        let mut source = Source {
            annotations: "instances.json".into(),
            splits: None,
            images: ".".into(),
            num_folds: 5,
            bbox_tolerance: 1e-6,
        };

        source.bbox_tolerance = 1.0;
        assert_eq!(violations_note(&source, &dataset), None);

        source.bbox_tolerance = 1e-6;
        assert_eq!(
            violations_note(&source, &dataset).as_deref(),
            Some(
                "note: found 1 consistency violations, see `akudental \
                validate`"
            )
        );
        Ok(())
    }

    #[test]
    fn summary_by_category() -> TestResult {
        let (_, rows) = by_category(&from_value(minimal())?);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], ["8", "8", "tooth", "1", "1"]);
        assert_eq!(rows[1], ["33", "implant", "implant", "0", "0"]);
        Ok(())
    }
}
