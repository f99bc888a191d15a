use nsw_map::data::{Ingestor, LoadOutcome, LoadStatus, SourceLocator, SAMPLE_CSV};
use nsw_map::parser::parse;
use nsw_map::validate::Validator;
use nsw_map::{ErrorKind, IngestError};
use pretty_assertions::assert_eq;
use std::io::Write;

const HEADER: &str = "name,latitude,longitude,value,category";

#[test]
fn invalid_latitude_row_is_rejected_not_fatal() {
    let text = format!("{}\nA,-33.8,151.2,10,x\nB,999,151.2,5,y\n", HEADER);
    let validated = Validator::default().validate(&parse(&text)).unwrap();
    assert_eq!(validated.points.len(), 1);
    assert_eq!(validated.points[0].name, "A");
    assert_eq!(validated.rejected, 1);
}

#[test]
fn missing_value_column_is_a_schema_error() {
    let text = "name,latitude,longitude,category\nA,-33.8,151.2,x\n";
    let err = Validator::default().validate(&parse(text)).unwrap_err();
    match &err {
        IngestError::Schema { missing } => assert_eq!(missing, &vec!["value".to_string()]),
        other => panic!("expected schema error, got {:?}", other),
    }
    assert_eq!(err.kind(), ErrorKind::Schema);
}

#[test]
fn all_rows_rejected_is_distinct_from_schema_error() {
    let text = format!("{}\nA,10.0,151.2,1,x\nB,-33.0,20.0,2,y\n", HEADER);
    let err = Ingestor::default().ingest_text(&text).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyResult);
    assert!(err.to_string().contains("No valid data found"));

    let header_only = Ingestor::default().ingest_text(HEADER).unwrap_err();
    assert_eq!(header_only.kind(), ErrorKind::EmptyResult);
}

#[test]
fn mismatched_rows_count_as_rejected() {
    let text = format!("{}\nA,-33.8,151.2,10,x\nB,-33.8,151.2\n\n\n", HEADER);
    let validated = Validator::default().validate(&parse(&text)).unwrap();
    assert_eq!(validated.points.len(), 1);
    assert_eq!(validated.rejected, 1);
}

#[test]
fn valid_points_revalidate_without_rejections() {
    let validator = Validator::default();
    let validated = validator.validate(&parse(SAMPLE_CSV)).unwrap();
    for point in &validated.points {
        let again = validator.validate_record(&point.to_record()).unwrap();
        assert_eq!(&again, point);
    }
}

#[test]
fn empty_category_gets_default() {
    let text = format!("{}\n\"Wagga Wagga\",-35.11,147.37,4.5,\n", HEADER);
    let validated = Validator::default().validate(&parse(&text)).unwrap();
    assert_eq!(validated.points[0].name, "Wagga Wagga");
    assert_eq!(validated.points[0].category, "Uncategorized");
}

#[tokio::test]
async fn loads_sample_and_reports_summary() {
    let ingestor = Ingestor::default();
    let outcome = ingestor.load_from_source(&SourceLocator::Sample).await.unwrap();
    let LoadOutcome::Applied(points) = outcome else {
        panic!("sample load was superseded");
    };
    assert_eq!(ingestor.status(), LoadStatus::Ready);

    let summary = points.summary();
    assert_eq!(summary.points, points.len());
    assert_eq!(summary.rejected, 0);
    assert!(summary.categories > 1);
    let (lo, hi) = summary.value_range.unwrap();
    assert!(lo <= hi);
}

#[tokio::test]
async fn loads_csv_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "{}", HEADER).unwrap();
    writeln!(file, "Sydney,-33.87,151.21,12.5,city").unwrap();
    writeln!(file, "Nowhere,-50.0,151.21,1,void").unwrap();

    let ingestor = Ingestor::default();
    let outcome = ingestor
        .load_from_source(&SourceLocator::Path(file.path().to_path_buf()))
        .await
        .unwrap();
    match outcome {
        LoadOutcome::Applied(points) => {
            assert_eq!(points.len(), 1);
            assert_eq!(points.rejected(), 1);
        }
        LoadOutcome::Superseded => panic!("unexpected supersede"),
    }
}

#[tokio::test]
async fn failed_reload_keeps_the_previous_set_visible() {
    let ingestor = Ingestor::default();
    let rx = ingestor.subscribe();
    ingestor.load_from_source(&SourceLocator::Sample).await.unwrap();
    let before = ingestor.current();

    let err = ingestor
        .load_from_uploaded_text("just,some,text\n1,2,3\n")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);

    let state = rx.borrow();
    assert!(state.points.same_as(&before));
    assert!(matches!(state.status, LoadStatus::Failed { kind: ErrorKind::Schema, .. }));
}

#[test]
fn quoted_fields_after_spaces_are_unwrapped() {
    let text = "name, latitude, longitude, value, category\n\"Sydney\", -33.8, 151.2, 10, \"city, harbour\"\n";
    let validated = Validator::default().validate(&parse(text)).unwrap();
    assert_eq!(validated.rejected, 0);
    assert_eq!(validated.points[0].name, "Sydney");
    assert_eq!(validated.points[0].category, "city, harbour");
}
