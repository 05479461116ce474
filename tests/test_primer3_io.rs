/// primer3 request and response files: writing requests, reading
/// (possibly partial) responses and the settings file handed to primer3.
use anyhow::Result;
use pretty_assertions::assert_eq;
use std::fs;
use std::io::Cursor;
use tempfile::TempDir;

use ssrpipe::boulder::{count_terminated_records, BoulderRecord, BoulderRecords};
use ssrpipe::primer3_settings::Primer3Settings;
use ssrpipe::primer_request::{PrimerRequestRecord, PrimerRequestWriter};
use ssrpipe::primer_response::{count_responses, PrimerResponseParser, PrimerResponseRecord};
use ssrpipe::repeats::{detect, RepeatSettings};

use test_utils::contig_with_repeat;

/// Answer a request the way primer3 does: echo the id and template and
/// add the designed pairs.
fn respond(request: &BoulderRecord, pairs: usize) -> BoulderRecord {
    let mut response = BoulderRecord::default();
    for key in ["SEQUENCE_ID", "SEQUENCE_TEMPLATE"] {
        if let Some(value) = request.get(key) {
            response.push(key, value);
        }
    }
    response.push("PRIMER_PAIR_NUM_RETURNED", pairs);
    for i in 0..pairs {
        response.push(format!("PRIMER_LEFT_{i}_SEQUENCE"), "GATCGTAGCT");
        response.push(format!("PRIMER_RIGHT_{i}_SEQUENCE"), "CTGATCGCAT");
        response.push(format!("PRIMER_LEFT_{i}"), format!("{},10", i));
        response.push(format!("PRIMER_RIGHT_{i}"), format!("{},10", 99 - i));
        response.push(format!("PRIMER_LEFT_{i}_TM"), "59.9");
        response.push(format!("PRIMER_RIGHT_{i}_TM"), "60.1");
        response.push(format!("PRIMER_PAIR_{i}_PRODUCT_SIZE"), 100 - 2 * i);
    }
    response.terminated = true;
    response
}

#[test]
fn test_request_round_trip_keeps_sequence_id() -> Result<()> {
    let settings = RepeatSettings::default();
    let template = format!("{}{}", contig_with_repeat("AG", 22), contig_with_repeat("T", 35));
    let repeats = detect(&template, &settings.definitions, settings.interruptions);
    assert_eq!(repeats.len(), 2);

    let mut request_text = Vec::new();
    for repeat in &repeats {
        PrimerRequestRecord::for_repeat("contig 9", &template, repeat, None)
            .to_record()
            .write_to(&mut request_text)?;
    }
    assert_eq!(count_terminated_records(Cursor::new(&request_text))?, 2);

    let mut response_text = Vec::new();
    for request in BoulderRecords::new(Cursor::new(&request_text)) {
        respond(&request?, 2).write_to(&mut response_text)?;
    }

    let responses: Vec<PrimerResponseRecord> =
        PrimerResponseParser::new(Cursor::new(response_text)).collect::<Result<_>>()?;
    let ids: Vec<&str> = responses.iter().map(|r| r.sequence_id.as_str()).collect();
    assert_eq!(ids, vec!["contig 9_1", "contig 9_2"]);
    for response in &responses {
        assert!(response.sequence_id.starts_with("contig 9_"));
        assert_eq!(response.template, template);
        assert_eq!(response.pairs.len(), 2);
    }
    assert_eq!(responses[0].pairs[1].start, "1");
    assert_eq!(responses[0].pairs[1].end, "98");
    assert_eq!(responses[0].pairs[1].product_size, "98");
    Ok(())
}

#[test]
fn test_target_near_start_keeps_negative_offset() {
    let template = format!("AC{}", "G".repeat(30));
    let repeats = detect(&template, &RepeatSettings::default().definitions, 0);
    assert_eq!(repeats[0].start, 3);
    let request = PrimerRequestRecord::for_repeat("s", &template, &repeats[0], None);
    assert_eq!(request.target, (0, 36));
    let record = request.to_record();
    assert_eq!(record.get("SEQUENCE_TARGET"), Some("0,36"));

    let template = format!("A{}", "G".repeat(30));
    let repeats = detect(&template, &RepeatSettings::default().definitions, 0);
    let request = PrimerRequestRecord::for_repeat("s", &template, &repeats[0], None);
    assert_eq!(request.target, (-1, 35));
}

#[test]
fn test_request_writer_is_lazy() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("contigs.p3in");
    let writer = PrimerRequestWriter::new(&path);
    assert_eq!(writer.records_written(), 0);
    assert_eq!(writer.finish()?, None);
    assert!(!path.exists());
    Ok(())
}

#[test]
fn test_partial_response_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("contigs.p3out");
    fs::write(
        &path,
        "SEQUENCE_ID=a_1\nSEQUENCE_TEMPLATE=ACGT\nPRIMER_PAIR_NUM_RETURNED=0\n=\n\
         SEQUENCE_ID=a_2\nSEQUENCE_TEMPLATE=ACGT\nPRIMER_LEFT_0_SEQUENCE=AC\nPRIMER_LEFT_0=0,2\n",
    )?;

    let responses: Vec<PrimerResponseRecord> =
        PrimerResponseParser::open(&path)?.collect::<Result<_>>()?;
    assert_eq!(responses.len(), 2);
    assert!(!responses[0].is_valid());
    // The open pair at the end of the stream is kept
    assert!(responses[1].is_valid());
    assert_eq!(responses[1].pairs[0].left_sequence, "AC");
    assert_eq!(responses[1].pairs[0].product_size, "");

    assert_eq!(count_responses(&path)?, (1, 2));
    Ok(())
}

#[test]
fn test_primer3_settings_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("Primer3_Settings.txt");

    let mut settings = Primer3Settings::default();
    assert!(settings.set("PRIMER_NUM_RETURN", "3"));
    assert!(!settings.set("NOT_A_PRIMER3_KEY", "1"));
    settings.save(&path)?;

    let text = fs::read_to_string(&path)?;
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("Primer3 File - http://primer3.sourceforge.net"));
    assert_eq!(lines.next(), Some("P3_FILE_TYPE=settings"));
    assert_eq!(lines.next(), Some(""));
    assert_eq!(text.lines().last(), Some("="));

    let loaded = Primer3Settings::load(&path)?;
    assert_eq!(loaded.num_return(), 3);
    assert_eq!(loaded, settings);
    Ok(())
}
