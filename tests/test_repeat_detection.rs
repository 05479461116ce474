/// Repeat detection tests: scanning, compound merging and the annotation
/// and statistics files written from the results.
use anyhow::Result;
use pretty_assertions::assert_eq;
use std::fs;
use std::io::Cursor;
use tempfile::TempDir;

use ssrpipe::annotation::{AnnotationReader, AnnotationWriter, RepeatStats, ANNOTATION_HEADER};
use ssrpipe::repeats::{detect, scan, RepeatDefinition, RepeatKind, RepeatSettings};

use test_utils::contig_with_repeat;

#[test]
fn test_dinucleotide_scenario() {
    let records = scan("GGTTACACACACACACGG", RepeatDefinition::new(2, 5));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].motif, "AC");
    assert_eq!(records[0].repeats, 6);
    assert_eq!((records[0].start, records[0].end), (5, 16));
}

#[test]
fn test_two_base_gap_merges_as_compound() {
    let sequence = format!("{}GT{}", "A".repeat(10), "C".repeat(10));
    let repeats = detect(&sequence, &[RepeatDefinition::new(1, 10)], 3);
    assert_eq!(repeats.len(), 1);
    let compound = &repeats[0];
    assert_eq!(compound.kind, RepeatKind::Compound);
    assert_eq!(compound.kind.to_string(), "c");
    assert_eq!(compound.notation, "(A)10gt(C)10");
    assert_eq!((compound.start, compound.end), (1, 22));
    assert_eq!(compound.size(), 22);
}

#[test]
fn test_gap_beyond_interruptions_stays_separate() {
    let sequence = format!("{}GTG{}", "A".repeat(10), "C".repeat(10));
    let repeats = detect(&sequence, &[RepeatDefinition::new(1, 10)], 1);
    assert_eq!(repeats.len(), 2);
    assert_eq!(repeats[0].number, 1);
    assert_eq!(repeats[1].number, 2);
    assert_eq!(repeats[1].kind, RepeatKind::Simple(1));
}

#[test]
fn test_default_definitions_report_minimal_unit() {
    let settings = RepeatSettings::default();
    let sequence = contig_with_repeat("AC", 25);
    let repeats = detect(&sequence, &settings.definitions, settings.interruptions);
    assert_eq!(repeats.len(), 1);
    assert_eq!(repeats[0].notation, "(AC)25");
    assert_eq!(repeats[0].kind, RepeatKind::Simple(2));
    assert_eq!(repeats[0].start, 21);
    assert_eq!(repeats[0].size(), 50);
}

#[test]
fn test_annotation_file_and_reader() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("contigs.misa");
    let settings = RepeatSettings::default();

    let mut writer = AnnotationWriter::new(&path);
    let mut stats = RepeatStats::default();
    for (id, sequence) in [
        ("c1", contig_with_repeat("AC", 25)),
        ("c2", contig_with_repeat("", 0)),
        ("c3", contig_with_repeat("T", 35)),
    ] {
        let repeats = detect(&sequence, &settings.definitions, settings.interruptions);
        stats.add_sequence(&sequence);
        stats.add_repeats(&repeats);
        writer.write_repeats(id, &repeats)?;
    }
    assert_eq!(writer.finish()?, Some(path.clone()));

    let text = fs::read_to_string(&path)?;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], ANNOTATION_HEADER);
    assert_eq!(lines[1], "c1\t1\tp2\t(AC)25\t50\t21\t70");
    assert_eq!(lines[2], "c3\t1\tp1\t(T)35\t35\t21\t55");
    assert_eq!(lines.len(), 3);

    let mut reader = AnnotationReader::open(&path)?;
    assert_eq!(reader.find_forward("c3_1")?.map(|l| l.request_id()), Some("c3_1".to_string()));
    // Forward only: c1 is behind the cursor now
    assert_eq!(reader.find_forward("c1_1")?, None);

    assert_eq!(stats.sequences_examined, 3);
    assert_eq!(stats.total_repeats, 2);
    assert_eq!(stats.sequences_with_repeats, 2);
    assert_eq!(stats.sequences_with_multiple_repeats, 0);
    Ok(())
}

#[test]
fn test_statistics_report() -> Result<()> {
    let settings = RepeatSettings::default();
    let mut stats = RepeatStats::default();
    let sequence = format!("{}GT{}", "A".repeat(30), "C".repeat(30));
    let repeats = detect(&sequence, &settings.definitions, 5);
    stats.add_sequence(&sequence);
    stats.add_repeats(&repeats);
    assert_eq!(stats.repeats_in_compounds, 1);

    let mut report = Vec::new();
    stats.write_report(Cursor::new(&mut report), "x/contigs.fa".as_ref(), &settings)?;
    let report = String::from_utf8(report)?;
    assert!(report.contains("Sequence source file: \"contigs.fa\""));
    assert!(report.contains("(1/30)(2/20)(3/10)(4/8)(5/6)(6/6)"));
    assert!(report.contains("Total number of identified SSRs:                 1"));
    assert!(report.contains("Number of SSRs present in compound formation:    1"));
    Ok(())
}

#[test]
fn test_settings_file_overrides() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("misa.ini");
    fs::write(
        &path,
        "definition(unit_size,min_repeats):   2-6 1-12\ninterruptions(max_difference_between_2_SSRs): 4\nGFF: false\nExport statistics: false\n",
    )?;
    let settings = RepeatSettings::load(&path)?;
    assert_eq!(
        settings.definitions,
        vec![RepeatDefinition::new(1, 12), RepeatDefinition::new(2, 6)]
    );
    assert_eq!(settings.interruptions, 4);
    assert!(!settings.export_statistics);
    Ok(())
}
