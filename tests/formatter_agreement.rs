//! The three encoders must agree on field order, type semantics, and fill
//! rendering for the same record stream. This drives one stream through
//! each encoder and cross-checks the decoded values.

use heliostream::format::{BinaryFormatter, CsvFormatter, DataFormatter, JsonFormatter};
use heliostream::records::{BufferedCursor, DatumBuf, RecordCursor};
use heliostream::schema::{FieldDef, FieldType, Schema};
use heliostream::time::TimeComponents;

fn schema() -> Schema {
    Schema::new(
        vec![
            FieldDef::new("Time", FieldType::Isotime).with_length(24),
            FieldDef::new("density", FieldType::Double).with_fill("-1e31"),
            FieldDef::new("bgse", FieldType::Double)
                .with_fill("-1e31")
                .with_size(&[3]),
            FieldDef::new("flag", FieldType::Integer),
            FieldDef::new("mode", FieldType::String).with_length(8),
        ],
        TimeComponents::new(2023, 1, 1, 0, 0, 0),
        TimeComponents::new(2024, 1, 1, 0, 0, 0),
    )
    .unwrap()
}

fn rows() -> Vec<Vec<DatumBuf>> {
    vec![
        vec![
            DatumBuf::Isotime("2023-04-26T00:00:00.000Z".into()),
            DatumBuf::Double(7.25),
            DatumBuf::DoubleArray(vec![1.0, 0.5, -0.5]),
            DatumBuf::Integer(3),
            DatumBuf::Str("survey".into()),
        ],
        vec![
            DatumBuf::Isotime("2023-04-26T00:01:00.000Z".into()),
            DatumBuf::Double(-1e31),
            DatumBuf::DoubleArray(vec![-1e31, 2.0, -1e31]),
            DatumBuf::Integer(-1),
            DatumBuf::Str("burst".into()),
        ],
    ]
}

fn encode(fmt: &mut dyn DataFormatter) -> Vec<u8> {
    let schema = schema();
    let mut c = BufferedCursor::new(rows());
    let mut out = Vec::new();
    assert!(c.advance().unwrap());
    fmt.initialize(&schema, &mut c, &mut out).unwrap();
    fmt.send_record(&mut c, &mut out).unwrap();
    while c.advance().unwrap() {
        fmt.send_record(&mut c, &mut out).unwrap();
    }
    fmt.finalize(&mut out).unwrap();
    out
}

#[test]
fn csv_and_json_agree_on_every_value() {
    let csv = String::from_utf8(encode(&mut CsvFormatter::new())).unwrap();
    let json = String::from_utf8(encode(&mut JsonFormatter::new())).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&json).unwrap();
    let data = doc["data"].as_array().unwrap();

    let csv_lines: Vec<&str> = csv.lines().collect();
    assert_eq!(csv_lines.len(), data.len());

    for (line, rec) in csv_lines.iter().zip(data) {
        let cols: Vec<&str> = line.split(',').collect();
        assert_eq!(cols[0], rec[0].as_str().unwrap());
        // density: same text for data and for fill
        assert_eq!(cols[1], rec[1].to_string());
        // bgse flattens in CSV, nests in JSON
        for j in 0..3 {
            assert_eq!(cols[2 + j], rec[2][j].to_string());
        }
        assert_eq!(cols[5], rec[3].to_string());
        assert_eq!(cols[6].trim_matches('"'), rec[4].as_str().unwrap());
    }
}

#[test]
fn binary_agrees_with_csv_semantics() {
    let bin = encode(&mut BinaryFormatter::new());
    // 24 time + 8 density + 24 bgse + 4 flag + 8 mode per record
    let rec_size = 24 + 8 + 24 + 4 + 8;
    assert_eq!(bin.len(), 2 * rec_size);

    let rec = &bin[rec_size..];
    assert_eq!(&rec[..24], b"2023-04-26T00:01:00.000Z");
    assert_eq!(f64::from_le_bytes(rec[24..32].try_into().unwrap()), -1e31);
    assert_eq!(f64::from_le_bytes(rec[40..48].try_into().unwrap()), 2.0);
    assert_eq!(i32::from_le_bytes(rec[56..60].try_into().unwrap()), -1);
    assert_eq!(&rec[60..68], b"burst\0\0\0");
}

#[test]
fn fill_is_the_exact_declared_literal_everywhere() {
    let csv = String::from_utf8(encode(&mut CsvFormatter::new())).unwrap();
    let json = String::from_utf8(encode(&mut JsonFormatter::new())).unwrap();
    let bin = encode(&mut BinaryFormatter::new());

    assert!(csv.contains(",-1e31,"));
    assert!(json.contains(",-1e31,"));
    let rec_size = 24 + 8 + 24 + 4 + 8;
    let fill_bytes = (-1e31f64).to_le_bytes();
    assert_eq!(&bin[rec_size + 24..rec_size + 32], &fill_bytes);
}

#[test]
fn all_encoders_reject_a_bad_first_record() {
    let schema = schema();
    let bad = vec![vec![
        DatumBuf::Isotime("2023-04-26T00:00:00.000".into()), // no Z marker
        DatumBuf::Double(1.0),
        DatumBuf::DoubleArray(vec![0.0; 3]),
        DatumBuf::Integer(0),
        DatumBuf::Str("x".into()),
    ]];
    for fmt in [
        &mut CsvFormatter::new() as &mut dyn DataFormatter,
        &mut BinaryFormatter::new(),
        &mut JsonFormatter::new(),
    ] {
        let mut c = BufferedCursor::new(bad.clone());
        assert!(c.advance().unwrap());
        let mut out = Vec::new();
        assert!(fmt.initialize(&schema, &mut c, &mut out).is_err());
    }
}
