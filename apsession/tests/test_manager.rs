use apremote::VlcClient;
use apsession::{
    ActivationStrategy, Error, ErrorKind, PlaybackManager, PlayerLauncher, ProcessSupervisor,
    SupervisorSettings, SupervisorState, UploadOutcome, UploadRequest,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::process::Command;

const STATUS_XML: &str = "<root><currentplid>3</currentplid><volume>256</volume>\
<length>12</length><time>0</time><state>playing</state></root>";

/// Lecteur factice : un `sleep` par processus
struct SleepLauncher;

impl PlayerLauncher for SleepLauncher {
    fn program(&self) -> String {
        "sleep".to_string()
    }

    fn command(&self, _playlist: &Path) -> Command {
        let mut command = Command::new("sleep");
        command.arg("600");
        command
    }
}

fn settings() -> SupervisorSettings {
    SupervisorSettings {
        grace_delay: Duration::from_millis(100),
        poll_interval: Duration::from_millis(500),
        quiescence_delay: Duration::from_millis(20),
        stop_timeout: Duration::from_secs(2),
        max_consecutive_failures: 5,
        max_backoff: Duration::from_secs(2),
    }
}

struct Fixture {
    _temp_dir: TempDir,
    uploads: PathBuf,
    manager: PlaybackManager,
}

fn create_manager(strategy: ActivationStrategy, remote_port: Option<u16>) -> Fixture {
    let temp_dir = tempfile::tempdir().unwrap();
    let uploads = temp_dir.path().join("uploads");
    std::fs::create_dir_all(&uploads).unwrap();

    let mut builder = PlaybackManager::builder()
        .videos_dir(temp_dir.path().join("videos"))
        .state_dir(temp_dir.path().join("state"))
        .default_playlist(temp_dir.path().join("none/none.m3u"))
        .supervisor(ProcessSupervisor::new(Arc::new(SleepLauncher), settings()))
        .strategy(strategy);
    if let Some(port) = remote_port {
        builder = builder.remote(
            VlcClient::builder()
                .host("127.0.0.1")
                .port(port)
                .password("tecno")
                .timeout(Duration::from_millis(500))
                .build()
                .unwrap(),
        );
    }

    Fixture {
        _temp_dir: temp_dir,
        uploads,
        manager: builder.build().unwrap(),
    }
}

/// Envoie un lot complet de fichiers
async fn upload_batch(fixture: &Fixture, label: &str, files: &[&str]) -> UploadOutcome {
    let mut outcome = None;
    for (ordinal, name) in files.iter().enumerate() {
        let temp_file = fixture.uploads.join(format!("upload-{}-{}", label, ordinal));
        std::fs::write(&temp_file, name.as_bytes()).unwrap();
        outcome = Some(
            fixture
                .manager
                .handle_upload(UploadRequest {
                    batch_label: Some(label.to_string()),
                    declared_total: files.len(),
                    ordinal,
                    temp_file,
                    original_name: name.to_string(),
                })
                .await
                .unwrap(),
        );
    }
    outcome.unwrap()
}

fn dir_names(videos: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(videos)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

async fn stub_player() -> (u16, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = requests.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let seen = seen.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&buf).to_string();
                seen.lock()
                    .unwrap()
                    .push(head.lines().next().unwrap_or_default().to_string());

                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    STATUS_XML.len(),
                    STATUS_XML
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (port, requests)
}

fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_evening_upload_replaces_playlists() {
    let fixture = create_manager(ActivationStrategy::Restart, None);
    let manager = &fixture.manager;
    let videos = manager.videos_dir().to_path_buf();

    // aucune playlist active : le lecteur n'est pas lancé
    assert_eq!(manager.start().await.unwrap().active, None);
    assert_eq!(manager.supervisor().status().await.state, SupervisorState::Stopped);

    upload_batch(&fixture, "morning", &["m.mp4"]).await;
    upload_batch(&fixture, "noon", &["n.mp4"]).await;
    std::fs::create_dir_all(videos.join("junk")).unwrap();
    assert_eq!(dir_names(&videos), ["junk", "morning", "noon"]);

    let outcome = upload_batch(&fixture, "evening", &["intro.mp4", "main.mp4", "outro.mp4"]).await;
    match outcome {
        UploadOutcome::Complete {
            name, total_files, ..
        } => {
            assert_eq!(name, "evening");
            assert_eq!(total_files, 3);
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    // seuls l'actif et le précédent restent
    assert_eq!(dir_names(&videos), ["evening", "noon"]);
    let record = manager.active().await.unwrap();
    assert_eq!(record.active, Some(videos.join("evening/evening.m3u")));
    assert!(manager.stale_playlists().await.unwrap().is_empty());

    let history: Vec<PathBuf> = manager
        .history()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.playlist)
        .collect();
    assert_eq!(
        history,
        vec![
            videos.join("morning/morning.m3u"),
            videos.join("noon/noon.m3u"),
            videos.join("evening/evening.m3u"),
        ]
    );

    let status = manager.status().await.unwrap();
    assert_eq!(status.supervisor.state, SupervisorState::Running);
    assert_eq!(status.supervisor.playlist, Some(videos.join("evening/evening.m3u")));
    assert!(status.upload.is_none());

    manager.shutdown().await.unwrap();
    assert_eq!(manager.supervisor().status().await.state, SupervisorState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_protected_playlists_are_not_deleted() {
    let fixture = create_manager(ActivationStrategy::Restart, None);
    let manager = &fixture.manager;

    upload_batch(&fixture, "noon", &["n.mp4"]).await;
    upload_batch(&fixture, "evening", &["e.mp4"]).await;

    // lot "late" ouvert : 1 fichier sur 2
    let temp_file = fixture.uploads.join("late-0");
    std::fs::write(&temp_file, b"late").unwrap();
    manager
        .handle_upload(UploadRequest {
            batch_label: Some("late".into()),
            declared_total: 2,
            ordinal: 0,
            temp_file,
            original_name: "l.mp4".into(),
        })
        .await
        .unwrap();

    let err = manager.delete_playlist("evening").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    let err = manager.delete_playlist("late").await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    let err = manager.delete_playlist("missing").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = manager.delete_playlist("../state").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let listed = manager.list_playlists().await.unwrap();
    let evening = listed.iter().find(|p| p.name == "evening").unwrap();
    assert!(evening.active);
    assert_eq!(evening.entries, 1);
    assert!(listed.iter().find(|p| p.name == "late").unwrap().uploading);

    let report = manager.delete_all().await.unwrap();
    assert_eq!(report.removed, ["noon"]);
    assert_eq!(report.skipped, ["evening", "late"]);
    assert_eq!(dir_names(manager.videos_dir()), ["evening", "late"]);

    manager.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_activate_by_name() {
    let fixture = create_manager(ActivationStrategy::Restart, None);
    let manager = &fixture.manager;
    let videos = manager.videos_dir().to_path_buf();

    upload_batch(&fixture, "first", &["a.mp4"]).await;
    upload_batch(&fixture, "second", &["b.mp4"]).await;

    let report = manager.activate_by_name("first").await.unwrap();
    assert_eq!(report.playlist, videos.join("first/first.m3u"));
    assert_eq!(report.previous, Some(videos.join("second/second.m3u")));
    assert_eq!(report.strategy, ActivationStrategy::Restart);
    assert!(report.removed.is_empty());
    assert_eq!(
        manager.supervisor().playlist().await,
        Some(videos.join("first/first.m3u"))
    );

    let err = manager.activate_by_name("nowhere").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // répertoire sans document
    std::fs::create_dir_all(videos.join("bare")).unwrap();
    let err = manager.activate_by_name("bare").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    manager.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_hot_swap_uses_remote_interface() {
    let (port, requests) = stub_player().await;
    let fixture = create_manager(ActivationStrategy::HotSwap, Some(port));
    let manager = &fixture.manager;
    let videos = manager.videos_dir().to_path_buf();

    // premier lot : le lecteur n'existe pas encore, il est lancé
    upload_batch(&fixture, "noon", &["n.mp4"]).await;
    assert_eq!(manager.supervisor().status().await.generation, 1);
    assert!(requests.lock().unwrap().is_empty());

    upload_batch(&fixture, "evening", &["e.mp4"]).await;

    let document = videos.join("evening/evening.m3u");
    assert_eq!(manager.active().await.unwrap().active, Some(document.clone()));
    assert_eq!(manager.supervisor().playlist().await, Some(document));
    // pas de processus relancé
    let status = manager.supervisor().status().await;
    assert_eq!(status.generation, 1);
    assert_eq!(status.state, SupervisorState::Running);

    {
        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 3, "{:?}", requests);
        assert!(requests[0].contains("command=pl_empty"));
        assert!(requests[1].contains("command=in_play"));
        assert!(requests[1].contains("evening.m3u"));
        assert!(!requests[2].contains("command="));
    }

    manager.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_hot_swap_starts_idle_player() {
    let fixture = create_manager(ActivationStrategy::HotSwap, Some(closed_port()));
    let manager = &fixture.manager;
    let videos = manager.videos_dir().to_path_buf();

    assert_eq!(manager.start().await.unwrap().active, None);
    upload_batch(&fixture, "evening", &["e.mp4"]).await;

    let status = manager.supervisor().status().await;
    assert_eq!(status.state, SupervisorState::Running);
    assert_eq!(status.generation, 1);
    assert_eq!(status.playlist, Some(videos.join("evening/evening.m3u")));

    // après un arrêt, l'activation suivante relance le lecteur
    manager.shutdown().await.unwrap();
    let report = manager.activate_by_name("evening").await.unwrap();
    assert_eq!(report.strategy, ActivationStrategy::Restart);
    assert_eq!(manager.supervisor().status().await.state, SupervisorState::Running);

    manager.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_hot_swap_failure_is_reported() {
    let fixture = create_manager(ActivationStrategy::HotSwap, Some(closed_port()));
    let manager = &fixture.manager;
    let videos = manager.videos_dir().to_path_buf();

    // lecteur lancé, interface de contrôle injoignable
    upload_batch(&fixture, "noon", &["n.mp4"]).await;

    let temp_file = fixture.uploads.join("upload");
    std::fs::write(&temp_file, b"x").unwrap();
    let err = manager
        .handle_upload(UploadRequest {
            batch_label: Some("evening".into()),
            declared_total: 1,
            ordinal: 0,
            temp_file,
            original_name: "e.mp4".into(),
        })
        .await
        .unwrap_err();

    let report = err.report();
    assert_eq!(report.kind, ErrorKind::Connectivity);
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["kind"], "connectivity");

    // le pointeur a été mis à jour avant l'échec
    assert_eq!(
        manager.active().await.unwrap().active,
        Some(videos.join("evening/evening.m3u"))
    );

    manager.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reactivation_keeps_previous_generation() {
    let fixture = create_manager(ActivationStrategy::Restart, None);
    let manager = &fixture.manager;
    let videos = manager.videos_dir().to_path_buf();

    upload_batch(&fixture, "first", &["a.mp4"]).await;
    upload_batch(&fixture, "second", &["b.mp4"]).await;
    upload_batch(&fixture, "third", &["c.mp4"]).await;
    assert_eq!(dir_names(&videos), ["second", "third"]);

    let report = manager.activate_by_name("third").await.unwrap();
    assert_eq!(report.previous, Some(videos.join("third/third.m3u")));
    assert!(report.removed.is_empty());
    assert_eq!(dir_names(&videos), ["second", "third"]);

    manager.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_batch_opened_during_deletion_survives() {
    let fixture = Arc::new(create_manager(ActivationStrategy::Restart, None));
    upload_batch(&fixture, "evening", &["e.mp4"]).await;

    for round in 0..20 {
        let label = format!("late{}", round);
        let temp_file = fixture.uploads.join(format!("late-{}", round));
        std::fs::write(&temp_file, b"late").unwrap();

        let deleting = {
            let fixture = fixture.clone();
            tokio::spawn(async move { fixture.manager.delete_all().await })
        };
        let uploading = {
            let fixture = fixture.clone();
            let label = label.clone();
            tokio::spawn(async move {
                fixture
                    .manager
                    .handle_upload(UploadRequest {
                        batch_label: Some(label),
                        declared_total: 2,
                        ordinal: 0,
                        temp_file,
                        original_name: "l.mp4".into(),
                    })
                    .await
            })
        };
        deleting.await.unwrap().unwrap();
        uploading.await.unwrap().unwrap();

        let batch_dir = fixture.manager.videos_dir().join(&label);
        assert!(batch_dir.join("l.mp4").exists(), "round {}", round);
        assert!(batch_dir.join(format!("{}.m3u", label)).exists());

        fixture.manager.abort_upload().await.unwrap();
    }

    fixture.manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_player_commands() {
    let (port, requests) = stub_player().await;
    let fixture = create_manager(ActivationStrategy::Restart, Some(port));
    let manager = &fixture.manager;

    let status = manager.player_status().await.unwrap();
    assert!(status.is_playing());

    let mut params = HashMap::new();
    params.insert("value".to_string(), "+10".to_string());
    manager.send_command("volume", &params).await.unwrap();

    let err = manager.send_command("quit", &HashMap::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].contains("command=volume"));
}
