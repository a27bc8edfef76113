use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use weather_host::{
    acquisition::{AcquisitionLoop, AcquisitionSettings, Outcome, READING_LIMIT},
    channel::{DataReceiver, SignalSender, data_channel, signal_channel},
    command::Command,
    device::{DeviceLink, TAG_BLINK, TAG_POLL},
    reading::{FRAME_LEN, Frame},
    store::{
        BUCKETS, HOURS, HistogramSet, Quantity, RECORD_CAPACITY, RECORD_FILE_NAME, RecordLog,
        RecordLogView,
    },
};

fn sensor_frame(i: usize) -> Frame {
    let mut frame = [0u8; FRAME_LEN];
    frame[0] = (i * 7) as u8;
    frame[1] = 64;
    frame[2] = 200;
    frame[3] = (i % 3) as u8;
    let ts = format!("202001{:02}{:02}00", 1 + i / 24, i % 24);
    frame[4..].copy_from_slice(ts.as_bytes());
    frame
}

/// Answers polls with `sensor_frame(n)` and records every other byte it receives.
/// Stops after `fail_after` polls, dropping the link, when given.
async fn fake_sensor(mut io: DuplexStream, fail_after: Option<usize>) -> Vec<u8> {
    let mut received = Vec::new();
    let mut polls = 0;
    loop {
        let mut tag = [0u8; 1];
        if io.read_exact(&mut tag).await.is_err() {
            return received;
        }
        match tag[0] {
            TAG_POLL => {
                if fail_after == Some(polls) {
                    return received;
                }
                io.write_all(&sensor_frame(polls)).await.unwrap();
                polls += 1;
            }
            TAG_BLINK => {
                let mut frequency = [0u8; 1];
                io.read_exact(&mut frequency).await.unwrap();
                received.extend_from_slice(&[TAG_BLINK, frequency[0]]);
            }
            other => received.push(other),
        }
    }
}

struct Rig {
    acquisition: AcquisitionLoop<DuplexStream>,
    sensor: JoinHandle<Vec<u8>>,
    signals: SignalSender,
    replies: DataReceiver,
}

fn rig(dir: &Path, fail_after: Option<usize>) -> Rig {
    let (host, device) = tokio::io::duplex(256);
    let (signals, signal_rx) = signal_channel();
    let (data_tx, replies) = data_channel();

    let acquisition = AcquisitionLoop::new(
        DeviceLink::new(host),
        signal_rx,
        data_tx,
        HistogramSet::open(dir).unwrap(),
        RecordLog::create(&dir.join(RECORD_FILE_NAME)).unwrap(),
    );

    Rig {
        acquisition,
        sensor: tokio::spawn(fake_sensor(device, fail_after)),
        signals,
        replies,
    }
}

fn limited(reading_limit: usize) -> AcquisitionSettings {
    AcquisitionSettings {
        reading_limit,
        ..AcquisitionSettings::default()
    }
}

fn histogram_total(dir: &Path, quantity: Quantity) -> usize {
    let view = HistogramSet::open_view(dir).unwrap();
    let histogram = view.get(quantity);
    (0..HOURS)
        .flat_map(|h| (0..BUCKETS).map(move |b| (h, b)))
        .map(|(h, b)| histogram.count(h, b) as usize)
        .sum()
}

#[tokio::test(start_paused = true)]
async fn full_run_stops_after_72_readings_despite_pauses() {
    let dir = tempfile::tempdir().unwrap();
    let Rig {
        acquisition,
        sensor,
        mut signals,
        replies: _replies,
    } = rig(dir.path(), None);

    let run = tokio::spawn(acquisition.run());

    sleep(Duration::from_secs(10)).await;
    signals.send(&Command::Pause).await.unwrap();
    sleep(Duration::from_secs(5)).await;
    signals.send(&Command::Resume).await.unwrap();
    sleep(Duration::from_secs(3)).await;
    signals.send(&Command::Blink(9)).await.unwrap();
    signals.send(&Command::Pause).await.unwrap();
    sleep(Duration::from_secs(30)).await;
    signals.send(&Command::Resume).await.unwrap();

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(
        outcome,
        Outcome::Completed {
            readings: READING_LIMIT
        }
    );

    let relayed = sensor.await.unwrap();
    assert_eq!(relayed, vec![b'p', b'r', TAG_BLINK, 9, b'p', b'r']);

    let records = RecordLogView::open(&dir.path().join(RECORD_FILE_NAME)).unwrap();
    let lines: Vec<&str> = records.records().collect();
    assert_eq!(lines.len(), RECORD_CAPACITY);
    assert_eq!(lines[0], "  000, 064, 200, 000, 202001010000,\n");
    assert_eq!(lines[71], "  241, 064, 200, 002, 202001032300,\n");

    for quantity in Quantity::ALL {
        assert_eq!(histogram_total(dir.path(), quantity), READING_LIMIT);
    }

    // Every hour of the day was seen once per day.
    let view = HistogramSet::open_view(dir.path()).unwrap();
    for hour in 0..HOURS {
        assert_eq!(view.get(Quantity::Pressure).count(hour, 4), 3);
    }
}

#[tokio::test(start_paused = true)]
async fn request_forwards_the_frame_just_read() {
    let dir = tempfile::tempdir().unwrap();
    let Rig {
        acquisition,
        sensor,
        mut signals,
        mut replies,
    } = rig(dir.path(), None);

    signals.send(&Command::Request).await.unwrap();
    let run = tokio::spawn(acquisition.with_settings(limited(3)).run());

    let frame = replies.recv_reply().await.unwrap();
    assert_eq!(frame, sensor_frame(0));

    assert_eq!(
        run.await.unwrap().unwrap(),
        Outcome::Completed { readings: 3 }
    );
    assert_eq!(sensor.await.unwrap(), vec![b'e']);
}

#[tokio::test(start_paused = true)]
async fn exit_ends_the_run_early() {
    let dir = tempfile::tempdir().unwrap();
    let Rig {
        acquisition,
        sensor: _sensor,
        mut signals,
        replies: _replies,
    } = rig(dir.path(), None);

    let run = tokio::spawn(acquisition.run());

    sleep(Duration::from_millis(4500)).await;
    signals.send(&Command::Exit).await.unwrap();

    match run.await.unwrap().unwrap() {
        Outcome::Exited { readings } => assert!((1..READING_LIMIT).contains(&readings)),
        other => panic!("expected exit, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn keeps_acquiring_after_operator_hangs_up() {
    let dir = tempfile::tempdir().unwrap();
    let Rig {
        acquisition,
        sensor: _sensor,
        signals,
        replies: _replies,
    } = rig(dir.path(), None);
    drop(signals);

    let outcome = acquisition.with_settings(limited(5)).run().await.unwrap();
    assert_eq!(outcome, Outcome::Completed { readings: 5 });
}

#[tokio::test(start_paused = true)]
async fn operator_hanging_up_while_paused_resumes_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let Rig {
        acquisition,
        sensor,
        mut signals,
        replies: _replies,
    } = rig(dir.path(), None);

    signals.send(&Command::Pause).await.unwrap();
    drop(signals);

    let outcome = timeout(
        Duration::from_secs(3600),
        acquisition.with_settings(limited(3)).run(),
    )
    .await
    .expect("paused run never completed")
    .unwrap();
    assert_eq!(outcome, Outcome::Completed { readings: 3 });
    assert_eq!(sensor.await.unwrap(), vec![b'p', b'r']);
}

#[tokio::test(start_paused = true)]
async fn unrecognised_signal_lines_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let Rig {
        acquisition,
        sensor,
        mut signals,
        replies: _replies,
    } = rig(dir.path(), None);

    signals.send_raw(b"hello\npaus\nblink x\n").await.unwrap();

    let outcome = acquisition.with_settings(limited(2)).run().await.unwrap();
    assert_eq!(outcome, Outcome::Completed { readings: 2 });
    drop(signals);
    assert!(sensor.await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn lost_device_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let Rig {
        acquisition,
        sensor: _sensor,
        signals: _signals,
        replies: _replies,
    } = rig(dir.path(), Some(2));

    let err = acquisition.run().await.unwrap_err();
    assert!(format!("{err:#}").contains("failed to poll sensor"));
}

#[tokio::test(start_paused = true)]
async fn restart_starts_a_fresh_log_but_keeps_histograms() {
    let dir = tempfile::tempdir().unwrap();

    for _ in 0..2 {
        let Rig {
            acquisition,
            sensor: _sensor,
            signals: _signals,
            replies: _replies,
        } = rig(dir.path(), None);
        acquisition.with_settings(limited(2)).run().await.unwrap();
    }

    let records = RecordLogView::open(&dir.path().join(RECORD_FILE_NAME)).unwrap();
    assert_eq!(records.records().count(), 2);
    assert_eq!(histogram_total(dir.path(), Quantity::Temperature), 4);
}
