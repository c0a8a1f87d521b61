use apsession::{Error, Playlist, UploadCoordinator, UploadProgress, UploadRequest};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Répertoires isolés : dépôt des uploads et playlists
fn create_dirs() -> (TempDir, PathBuf, PathBuf) {
    let temp_dir = tempfile::tempdir().unwrap();
    let uploads = temp_dir.path().join("uploads");
    let videos = temp_dir.path().join("videos");
    std::fs::create_dir_all(&uploads).unwrap();
    std::fs::create_dir_all(&videos).unwrap();
    (temp_dir, uploads, videos)
}

fn upload_file(uploads: &Path, name: &str) -> PathBuf {
    let path = uploads.join(format!("tmp-{}", name));
    std::fs::write(&path, name.as_bytes()).unwrap();
    path
}

fn request(label: Option<&str>, total: usize, ordinal: usize, temp: PathBuf, name: &str) -> UploadRequest {
    UploadRequest {
        batch_label: label.map(String::from),
        declared_total: total,
        ordinal,
        temp_file: temp,
        original_name: name.to_string(),
    }
}

#[tokio::test]
async fn test_ordered_upload_writes_document_in_order() {
    let (_temp_dir, uploads, videos) = create_dirs();
    let coordinator = UploadCoordinator::new(&videos);
    let names = ["intro.mp4", "b.mp4", "a.mp4", "outro.mp4", "z.mp4"];

    let mut last = None;
    for (ordinal, name) in names.iter().enumerate() {
        let temp = upload_file(&uploads, name);
        let progress = coordinator
            .begin_or_continue(request(Some("morning"), names.len(), ordinal, temp.clone(), name))
            .await
            .unwrap();

        // le fichier temporaire a été déplacé
        assert!(!temp.exists());

        // le document reflète exactement les fichiers reçus jusqu'ici
        let document = videos.join("morning/morning.m3u");
        let content = std::fs::read_to_string(&document).unwrap();
        assert_eq!(content.lines().count(), ordinal + 2);

        last = Some(progress);
    }

    let Some(UploadProgress::Complete(playlist)) = last else {
        panic!("batch should be complete");
    };
    assert_eq!(playlist.len(), names.len());

    let content = std::fs::read_to_string(playlist.document_path()).unwrap();
    let mut lines = content.lines();
    assert_eq!(lines.next(), Some("#EXTM3U"));
    let paths: Vec<PathBuf> = lines.map(PathBuf::from).collect();
    assert_eq!(paths.len(), names.len());
    for (path, name) in paths.iter().zip(names.iter()) {
        assert!(path.is_absolute());
        assert_eq!(path, &videos.join("morning").join(name));
        assert!(path.exists());
    }

    let reloaded = Playlist::load(&playlist.document_path()).await.unwrap();
    assert_eq!(reloaded.entries(), playlist.entries());
    assert!(coordinator.current().await.is_none());
}

#[tokio::test]
async fn test_second_batch_is_rejected_while_one_is_open() {
    let (_temp_dir, uploads, videos) = create_dirs();
    let coordinator = UploadCoordinator::new(&videos);

    coordinator
        .begin_or_continue(request(
            Some("evening"),
            3,
            0,
            upload_file(&uploads, "e1.mp4"),
            "e1.mp4",
        ))
        .await
        .unwrap();

    let intruder = upload_file(&uploads, "m1.mp4");
    let err = coordinator
        .begin_or_continue(request(Some("morning"), 2, 0, intruder.clone(), "m1.mp4"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)), "{err}");

    // rien n'a été écrit : ni dans le lot ouvert, ni ailleurs
    assert!(intruder.exists());
    assert!(!videos.join("evening/m1.mp4").exists());
    assert!(!videos.join("morning").exists());
    let document = std::fs::read_to_string(videos.join("evening/evening.m3u")).unwrap();
    assert!(!document.contains("m1.mp4"));
    assert_eq!(coordinator.current().await.unwrap().processed(), 1);
}

#[tokio::test]
async fn test_incomplete_batch_blocks_until_aborted() {
    let (_temp_dir, uploads, videos) = create_dirs();
    let coordinator = UploadCoordinator::new(&videos);

    let progress = coordinator
        .begin_or_continue(request(
            Some("pending"),
            2,
            0,
            upload_file(&uploads, "p1.mp4"),
            "p1.mp4",
        ))
        .await
        .unwrap();
    assert!(matches!(
        progress,
        UploadProgress::InProgress {
            current: 1,
            total: 2,
            ..
        }
    ));

    // le lot reste ouvert indéfiniment
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    for _ in 0..3 {
        let err = coordinator
            .begin_or_continue(request(
                Some("other"),
                1,
                0,
                upload_file(&uploads, "o1.mp4"),
                "o1.mp4",
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    let aborted = coordinator.abort().await.unwrap();
    assert_eq!(aborted.name(), "pending");
    assert_eq!(aborted.processed(), 1);

    // les fichiers du lot abandonné restent en place
    assert!(videos.join("pending/p1.mp4").exists());
    assert!(videos.join("pending/pending.m3u").exists());

    let progress = coordinator
        .begin_or_continue(request(
            Some("other"),
            1,
            0,
            upload_file(&uploads, "o1.mp4"),
            "o1.mp4",
        ))
        .await
        .unwrap();
    assert!(matches!(progress, UploadProgress::Complete(_)));
}

#[tokio::test]
async fn test_continuation_without_label() {
    let (_temp_dir, uploads, videos) = create_dirs();
    let coordinator = UploadCoordinator::new(&videos);

    coordinator
        .begin_or_continue(request(Some("noon"), 2, 0, upload_file(&uploads, "1.mp4"), "1.mp4"))
        .await
        .unwrap();
    let progress = coordinator
        .begin_or_continue(request(None, 2, 1, upload_file(&uploads, "2.mp4"), "2.mp4"))
        .await
        .unwrap();

    let UploadProgress::Complete(playlist) = progress else {
        panic!("batch should be complete");
    };
    assert_eq!(playlist.name(), "noon");
    assert_eq!(playlist.len(), 2);
}
