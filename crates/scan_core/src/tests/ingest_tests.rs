use super::*;
use std::io::Write;

#[test]
fn recognises_image_media_types() {
    assert!(is_image_media_type("image/jpeg"));
    assert!(is_image_media_type("IMAGE/PNG; charset=binary"));
    assert!(!is_image_media_type("image/"));
    assert!(!is_image_media_type("application/pdf"));
    assert!(!is_image_media_type("text/plain"));
    assert!(!is_image_media_type(""));
}

#[tokio::test]
async fn accepts_image_bytes_and_builds_data_uri() {
    let validator = FileIngestionValidator::default();
    let file = validator
        .validate(CandidateFile::from_bytes("scan.png", "Image/PNG", b"png".to_vec()))
        .await
        .expect("accepted");

    assert_eq!(file.file_name, "scan.png");
    assert_eq!(file.media_type, "image/png");
    assert_eq!(file.preview_data_uri, "data:image/png;base64,cG5n");
    assert_eq!(file.size_bytes(), 3);
}

#[tokio::test]
async fn rejects_non_image_type_with_unsupported_reason() {
    let validator = FileIngestionValidator::default();
    let err = validator
        .validate(CandidateFile::from_bytes(
            "report.pdf",
            "application/pdf",
            b"%PDF".to_vec(),
        ))
        .await
        .expect_err("rejected");

    assert_eq!(
        err,
        ValidationError::UnsupportedType {
            media_type: "application/pdf".to_string()
        }
    );
    assert!(err.to_string().starts_with("unsupported type"));
}

#[tokio::test]
async fn rejects_content_over_limit() {
    let validator = FileIngestionValidator::new(4);
    let err = validator
        .validate(CandidateFile::from_bytes("big.jpg", "image/jpeg", vec![0; 5]))
        .await
        .expect_err("too large");

    assert!(matches!(
        err,
        ValidationError::TooLarge {
            size_bytes: 5,
            limit_bytes: 4,
            ..
        }
    ));
}

#[tokio::test]
async fn reads_candidate_from_disk() {
    let mut temp = tempfile::Builder::new()
        .suffix(".jpg")
        .tempfile()
        .expect("tempfile");
    temp.write_all(&[0xFF, 0xD8, 0xFF, 0xE0]).expect("write");

    let candidate = CandidateFile::from_path_guessing_type(temp.path());
    assert_eq!(candidate.media_type, "image/jpeg");

    let file = FileIngestionValidator::default()
        .validate(candidate)
        .await
        .expect("accepted");
    assert_eq!(file.bytes, vec![0xFF, 0xD8, 0xFF, 0xE0]);
    assert!(file.preview_data_uri.starts_with("data:image/jpeg;base64,"));
}

#[tokio::test]
async fn missing_path_is_unreadable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = FileIngestionValidator::default()
        .validate(CandidateFile::from_path(
            dir.path().join("gone.png"),
            "image/png",
        ))
        .await
        .expect_err("unreadable");

    assert!(matches!(err, ValidationError::Unreadable { .. }));
}
