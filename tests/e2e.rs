use anyhow::Result;
use mediapull::cancel::CancelToken;
use mediapull::history::{HistoryLogger, TransferHistory, TransferStatus};
use mediapull::{Client, ClientOptions, Endpoint, FileOutcome, TransferError};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::path::Path;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn pattern(seed: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(7).wrapping_add(seed)).collect()
}

#[derive(Clone)]
struct PeerFile {
    name: String,
    kind: &'static str,
    data: Vec<u8>,
}

impl PeerFile {
    fn new(name: &str, kind: &'static str, seed: u8, len: usize) -> Self {
        Self {
            name: name.to_string(),
            kind,
            data: pattern(seed, len),
        }
    }
}

#[derive(Clone, Default)]
struct Behaviour {
    /// Stop sending payload once this many bytes of the file have gone out.
    truncate_at: Option<usize>,
    reject_transfers: bool,
    /// Send this many payload bytes of file 0, then hold the socket open
    /// without writing until the client goes away.
    stall_after: Option<usize>,
    /// Interrupt the client once the stall has begun.
    interrupt: Option<CancelToken>,
}

/// Scripted peer on a free local port. Records every command line it receives.
struct FakePeer {
    port: u16,
    commands: Arc<Mutex<Vec<String>>>,
}

impl FakePeer {
    fn start(files: Vec<PeerFile>, behaviour: Behaviour) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        let commands = Arc::new(Mutex::new(Vec::new()));
        let seen = commands.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let _ = serve_one(stream, &files, &behaviour, &seen);
            }
        });
        Ok(Self { port, commands })
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::new("127.0.0.1", self.port)
    }

    fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

fn catalog_json(files: &[PeerFile]) -> String {
    let records: Vec<String> = files
        .iter()
        .map(|f| {
            format!(
                r#"{{"name":"{}","size":{},"type":"{}"}}"#,
                f.name,
                f.data.len(),
                f.kind
            )
        })
        .collect();
    format!("[{}]", records.join(","))
}

fn serve_one(
    stream: TcpStream,
    files: &[PeerFile],
    behaviour: &Behaviour,
    seen: &Mutex<Vec<String>>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut out = stream;
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let line = line.trim_end().to_string();
    seen.lock().unwrap().push(line.clone());

    let parts: Vec<&str> = line.split(' ').collect();
    match parts.as_slice() {
        ["LIST"] => {
            let json = catalog_json(files);
            write!(out, "OK\n{}\n{}", json.len(), json)?;
        }
        ["COUNT"] => writeln!(out, "{}", files.len())?,
        [verb @ ("GET" | "RESUME"), index, rest @ ..] => {
            let resume = *verb == "RESUME";
            let file = index.parse::<usize>().ok().and_then(|i| files.get(i));
            match file {
                Some(_) if behaviour.reject_transfers => {
                    write!(out, "ERROR\nstorage permission revoked\n")?
                }
                None => write!(out, "ERROR\nno such file\n")?,
                Some(file) => {
                    let offset = if resume {
                        rest.first().and_then(|o| o.parse::<usize>().ok()).unwrap_or(0)
                    } else {
                        0
                    };
                    let total = file.data.len();
                    let stall = behaviour.stall_after.filter(|_| *index == "0");
                    let end = stall
                        .or(behaviour.truncate_at)
                        .unwrap_or(total)
                        .min(total);
                    write!(out, "OK\n{total}\n")?;
                    if resume {
                        write!(out, "{offset}\n")?;
                    }
                    write!(out, "{}\n", file.name)?;
                    if offset < end {
                        out.write_all(&file.data[offset..end])?;
                    }
                    if stall.is_some() {
                        out.flush()?;
                        // Let the client drain what was sent and block on the next read
                        thread::sleep(Duration::from_millis(200));
                        if let Some(token) = &behaviour.interrupt {
                            token.signal();
                        }
                        let mut rest = Vec::new();
                        let _ = reader.read_to_end(&mut rest);
                        return Ok(());
                    }
                }
            }
        }
        _ => write!(out, "ERROR\nunknown command\n")?,
    }
    out.flush()?;
    out.shutdown(Shutdown::Write)?;
    Ok(())
}

fn client(peer: &FakePeer, resume: bool) -> Result<Client> {
    let options = ClientOptions {
        resume,
        ..ClientOptions::default()
    };
    Ok(Client::new(peer.endpoint(), options)?)
}

fn read(path: &Path) -> Vec<u8> {
    std::fs::read(path).unwrap()
}

#[test]
fn resumes_from_local_partial_file() -> Result<()> {
    let video = PeerFile::new("x.mp4", "video", 1, 1000);
    let peer = FakePeer::start(vec![video.clone()], Behaviour::default())?;
    let dest = tempfile::tempdir()?;
    std::fs::write(dest.path().join("x.mp4"), &video.data[..400])?;

    let summary = client(&peer, true)?.download_all(dest.path(), None)?;

    assert_eq!(peer.commands(), vec!["LIST", "RESUME 0 400"]);
    assert_eq!(read(&dest.path().join("x.mp4")), video.data);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.bytes_transferred, 600);
    assert!(summary.all_ok());
    Ok(())
}

#[test]
fn complete_file_is_skipped_without_a_transfer() -> Result<()> {
    let image = PeerFile::new("done.jpg", "image", 2, 64);
    let peer = FakePeer::start(vec![image.clone()], Behaviour::default())?;
    let dest = tempfile::tempdir()?;
    std::fs::write(dest.path().join("done.jpg"), &image.data)?;

    let summary = client(&peer, true)?.download_all(dest.path(), None)?;

    assert_eq!(peer.commands(), vec!["LIST"]);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.bytes_transferred, 0);
    Ok(())
}

#[test]
fn second_run_only_lists() -> Result<()> {
    let files = vec![
        PeerFile::new("a.jpg", "image", 3, 5000),
        PeerFile::new("b.mp4", "video", 4, 70_000),
        PeerFile::new("empty.jpg", "image", 5, 0),
    ];
    let peer = FakePeer::start(files.clone(), Behaviour::default())?;
    let dest = tempfile::tempdir()?;

    let first = client(&peer, true)?.download_all(dest.path(), None)?;
    assert_eq!(first.succeeded, 3);
    for f in &files {
        assert_eq!(read(&dest.path().join(&f.name)), f.data);
    }
    assert_eq!(peer.commands(), vec!["LIST", "GET 0", "GET 1", "GET 2"]);

    let second = client(&peer, true)?.download_all(dest.path(), None)?;
    assert_eq!(second.skipped, 3);
    assert_eq!(second.succeeded, 0);
    assert_eq!(peer.commands().len(), 5);
    assert_eq!(peer.commands()[4], "LIST");
    Ok(())
}

#[test]
fn truncated_stream_keeps_partial_file_for_next_run() -> Result<()> {
    let video = PeerFile::new("clip.mp4", "video", 6, 1000);
    let flaky = FakePeer::start(
        vec![video.clone()],
        Behaviour {
            truncate_at: Some(300),
            ..Behaviour::default()
        },
    )?;
    let dest = tempfile::tempdir()?;
    let target = dest.path().join("clip.mp4");

    let summary = client(&flaky, true)?.download_all(dest.path(), None)?;
    assert_eq!(summary.partial, 1);
    assert!(!summary.all_ok());
    assert_eq!(read(&target), &video.data[..300]);

    let healthy = FakePeer::start(vec![video.clone()], Behaviour::default())?;
    let summary = client(&healthy, true)?.download_all(dest.path(), None)?;
    assert_eq!(healthy.commands(), vec!["LIST", "RESUME 0 300"]);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(read(&target), video.data);
    Ok(())
}

#[test]
fn without_resume_a_collision_gets_a_new_name() -> Result<()> {
    let image = PeerFile::new("a.jpg", "image", 7, 10);
    let peer = FakePeer::start(vec![image.clone()], Behaviour::default())?;
    let dest = tempfile::tempdir()?;
    std::fs::write(dest.path().join("a.jpg"), b"old")?;

    let summary = client(&peer, false)?.download_all(dest.path(), None)?;

    assert_eq!(peer.commands(), vec!["LIST", "GET 0"]);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(read(&dest.path().join("a.jpg")), b"old");
    assert_eq!(read(&dest.path().join("a_1.jpg")), image.data);
    Ok(())
}

#[test]
fn rejected_transfer_fails_only_that_file() -> Result<()> {
    let image = PeerFile::new("a.jpg", "image", 8, 10);
    let peer = FakePeer::start(
        vec![image],
        Behaviour {
            reject_transfers: true,
            ..Behaviour::default()
        },
    )?;
    let dest = tempfile::tempdir()?;
    let client = client(&peer, true)?;
    let inventory = client.fetch_catalog()?;

    match client.download(&inventory, 0, dest.path()) {
        FileOutcome::Failed {
            error: TransferError::Rejected { status, message },
        } => {
            assert_eq!(status, "ERROR");
            assert_eq!(message, "storage permission revoked");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(!dest.path().join("a.jpg").exists());
    Ok(())
}

#[test]
fn count_reports_catalog_size() -> Result<()> {
    let files = vec![
        PeerFile::new("a.jpg", "image", 9, 1),
        PeerFile::new("b.jpg", "image", 10, 2),
    ];
    let peer = FakePeer::start(files, Behaviour::default())?;
    assert_eq!(client(&peer, true)?.count()?, 2);
    assert_eq!(peer.commands(), vec!["COUNT"]);
    Ok(())
}

#[test]
fn refetch_checks_entry_before_each_transfer() -> Result<()> {
    let image = PeerFile::new("a.jpg", "image", 11, 20);
    let peer = FakePeer::start(vec![image.clone()], Behaviour::default())?;
    let dest = tempfile::tempdir()?;
    let options = ClientOptions {
        refetch: true,
        ..ClientOptions::default()
    };

    let summary = Client::new(peer.endpoint(), options)?.download_all(dest.path(), None)?;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(peer.commands(), vec!["LIST", "LIST", "GET 0"]);
    Ok(())
}

#[test]
fn history_records_each_finished_file() -> Result<()> {
    let files = vec![
        PeerFile::new("a.jpg", "image", 12, 10),
        PeerFile::new("b.mp4", "video", 13, 30),
    ];
    let peer = FakePeer::start(files.clone(), Behaviour::default())?;
    let dest = tempfile::tempdir()?;
    std::fs::write(dest.path().join("a.jpg"), &files[0].data)?;

    let history = Arc::new(HistoryLogger::new(dest.path()));
    client(&peer, true)?
        .with_logger(history.clone())
        .download_all(dest.path(), None)?;

    let entries = TransferHistory::new(dest.path()).read_log()?;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].status, TransferStatus::Skipped);
    assert_eq!(entries[1].status, TransferStatus::Completed);
    assert_eq!(entries[1].bytes_received, 30);
    assert!(entries.iter().all(|e| e.run_id == history.run_id()));
    Ok(())
}

#[test]
fn first_interrupt_abandons_only_the_current_file() -> Result<()> {
    let files = vec![
        PeerFile::new("x.mp4", "video", 14, 1000),
        PeerFile::new("y.jpg", "image", 15, 50),
    ];
    let token = CancelToken::new();
    let peer = FakePeer::start(
        files.clone(),
        Behaviour {
            stall_after: Some(100),
            interrupt: Some(token.clone()),
            ..Behaviour::default()
        },
    )?;
    let dest = tempfile::tempdir()?;
    let history = Arc::new(HistoryLogger::new(dest.path()));
    let client = client(&peer, true)?
        .with_cancel(token)
        .with_logger(history);

    let summary = client.download_all(dest.path(), None)?;

    assert_eq!(peer.commands(), vec!["LIST", "GET 0", "GET 1"]);
    assert_eq!(summary.partial, 1);
    assert_eq!(summary.succeeded, 1);
    assert!(!summary.cancelled);
    assert_eq!(read(&dest.path().join("x.mp4")), &files[0].data[..100]);
    assert_eq!(read(&dest.path().join("y.jpg")), files[1].data);

    let entries = TransferHistory::new(dest.path()).read_log()?;
    assert_eq!(entries[0].status, TransferStatus::Partial);
    assert_eq!(entries[0].bytes_received, 100);
    Ok(())
}

#[test]
fn interrupts_unblock_a_stalled_peer_and_stop_the_batch() -> Result<()> {
    let files = vec![
        PeerFile::new("x.mp4", "video", 16, 1000),
        PeerFile::new("y.jpg", "image", 17, 50),
    ];
    let peer = FakePeer::start(
        files,
        Behaviour {
            stall_after: Some(100),
            ..Behaviour::default()
        },
    )?;
    let dest = tempfile::tempdir()?;
    let token = CancelToken::new();
    let client = client(&peer, true)?.with_cancel(token.clone());

    let (tx, rx) = mpsc::channel();
    let dest_path = dest.path().to_path_buf();
    thread::spawn(move || {
        let inventory = client.fetch_catalog().unwrap();
        let first = client.download(&inventory, 0, &dest_path);
        let summary = client.download_inventory(
            &inventory,
            &dest_path,
            Some(&[1usize][..]),
            std::time::Instant::now(),
        );
        let _ = tx.send((first, summary));
    });

    thread::sleep(Duration::from_millis(400));
    token.signal();
    token.signal();

    let (first, summary) = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("download still blocked after two interrupts");
    match first {
        FileOutcome::Partial {
            outcome, cancelled, ..
        } => {
            assert!(cancelled);
            assert_eq!(outcome.bytes_received, 100);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(summary.cancelled);
    assert_eq!(summary.processed(), 0);
    assert_eq!(peer.commands(), vec!["LIST", "GET 0"]);
    assert_eq!(read(&dest.path().join("x.mp4")).len(), 100);
    Ok(())
}
