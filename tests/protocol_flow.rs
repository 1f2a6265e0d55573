use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use radio_bench::client::{Client, ClientState};
use radio_bench::config::{ClientConfig, Jitter, ReportingPolicy, ServerConfig};
use radio_bench::exchange;
use radio_bench::link::memory::Bus;
use radio_bench::proto::message::{Message, Report};
use radio_bench::report::ReportRecord;
use radio_bench::scenario::{DataRate, Scenarios, TuningParams, TxPower};
use radio_bench::server::{Server, ServerState};
use radio_bench::sim::{self, SimOptions};

const SERVER: u8 = 1;
const GIVE_UP: Duration = Duration::from_secs(20);

fn server_cfg() -> ServerConfig {
    ServerConfig {
        address: SERVER,
        pairing_period: Duration::from_millis(150),
        work_period: Duration::from_millis(200),
        reporting_ceiling: Duration::from_secs(2),
        tuning_period: Duration::from_millis(400),
        broadcast_for: Duration::from_millis(100),
        broadcast_gap: Duration::from_millis(5),
        poll: Duration::from_millis(5),
        reporting_policy: ReportingPolicy::AllReported,
        ..Default::default()
    }
}

fn client_cfg() -> ClientConfig {
    ClientConfig {
        server: SERVER,
        reply_timeout: Duration::from_millis(100),
        pairing_backoff: Jitter::millis(5, 15),
        // Longer than the WORK broadcast, so pings only start once the
        // server is actually working.
        work_start: Jitter::millis(150, 200),
        ping_gap: Jitter::millis(2, 4),
        report_backoff: Jitter::millis(5, 15),
        poll: Duration::from_millis(5),
        ..Default::default()
    }
}

fn sweep() -> Vec<TuningParams> {
    vec![
        TuningParams::new(2, DataRate::Mbps2, TxPower::ZeroDbm),
        TuningParams::new(5, DataRate::Kbps250, TxPower::ZeroDbm),
        TuningParams::new(9, DataRate::Mbps1, TxPower::Minus12Dbm),
    ]
}

/// Pairing, WORK broadcast, client moves Waiting -> Working.
#[test]
fn pairing_then_work() {
    let bus = Bus::new(0.0, 11);
    let server_link = bus.attach(SERVER);
    let client_link = bus.attach(7);

    thread::scope(|scope| {
        let server = scope.spawn(move || {
            let mut server = Server::new(server_link, Vec::new(), Scenarios::default(), server_cfg());
            let start = Instant::now();
            server.run_while(|s| s.state() == ServerState::Pairing && start.elapsed() < GIVE_UP);
            server
        });

        let mut client = Client::new(client_link, client_cfg()).with_seed(3);
        let start = Instant::now();
        let mut was_waiting = false;
        client.run_while(|c| {
            was_waiting |= c.state() == ClientState::Waiting;
            c.state() != ClientState::Working && start.elapsed() < GIVE_UP
        });
        assert!(was_waiting);
        assert_eq!(client.state(), ClientState::Working);

        let server = server.join().unwrap();
        assert_eq!(server.state(), ServerState::Working);
        assert_eq!(server.registry().len(), 1);
        assert_eq!(server.registry().find(7), Some(0));
    });
}

/// PING/PONG stats, QUERY, REPORT, record emission.
#[test]
fn one_cycle_produces_consistent_report() {
    let records = sim::run(
        SimOptions {
            clients: 2,
            loss: 0.0,
            seed: 5,
            cycles: 1,
            scenarios: Scenarios::default(),
            server: server_cfg(),
            client: client_cfg(),
        },
        Vec::<ReportRecord>::new(),
    )
    .unwrap();

    assert_eq!(records.len(), 2);
    let mut from: Vec<u8> = records.iter().map(|r| r.from).collect();
    from.sort();
    assert_eq!(from, vec![2, 3]);

    for rec in &records {
        let r = rec.report;
        assert_eq!(rec.params, Scenarios::default().current());
        assert!(r.num_reply > 0, "{rec}");
        assert!(r.num_reply <= r.num_success && r.num_success <= r.num_total, "{rec}");
        assert!(r.min_ping_ms <= r.avg_ping_ms && r.avg_ping_ms <= r.max_ping_ms, "{rec}");
        // Nothing is lost, so every acknowledged PING was counted once.
        assert_eq!(rec.server_pings, Some(r.num_success), "{rec}");
    }
}

/// A report with known values is emitted verbatim next to the server's count.
#[test]
fn report_record_carries_client_values() {
    let bus = Bus::new(0.0, 2);
    let server_link = bus.attach(SERVER);
    let mut fake = bus.attach(7);
    let wait = Duration::from_millis(50);

    let records = thread::scope(|scope| {
        let server = scope.spawn(move || {
            let mut server = Server::new(server_link, Vec::new(), Scenarios::default(), server_cfg());
            let start = Instant::now();
            server.run_while(|s| s.cycles() < 1 && start.elapsed() < GIVE_UP);
            server.into_sink()
        });

        let start = Instant::now();
        while start.elapsed() < GIVE_UP {
            if let Ok((Message::Welcome, _)) = exchange::request(&mut fake, &Message::Hello, SERVER, wait) {
                break;
            }
        }
        while start.elapsed() < GIVE_UP {
            if let Ok(Some((Message::Work, _))) = exchange::receive(&mut fake, wait) {
                break;
            }
        }
        thread::sleep(Duration::from_millis(150));
        exchange::drain(&mut fake);

        let mut pings = 0;
        while start.elapsed() < GIVE_UP {
            let ping = Message::Ping { timestamp_ms: pings };
            match exchange::request(&mut fake, &ping, SERVER, wait) {
                Ok((Message::Pong { timestamp_ms }, _)) => {
                    assert_eq!(timestamp_ms, pings);
                    pings += 1;
                }
                Ok((Message::Query, _)) => {
                    pings += 1;
                    break;
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        let report = Report {
            num_total: 100,
            num_success: 95,
            num_reply: 90,
            avg_ping_ms: 12,
            min_ping_ms: 5,
            max_ping_ms: 40,
        };
        let reply = exchange::request(&mut fake, &Message::Report(report), SERVER, wait).unwrap();
        assert_eq!(reply, (Message::Ok, SERVER));

        let records = server.join().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].report, report);
        assert_eq!(records[0].server_pings, Some(pings));
        assert_eq!(
            records[0].to_string(),
            format!("2,1,3,7,100,95,90,12,5,40,{pings}")
        );
        records
    });
    assert_eq!(records[0].from, 7);
}

/// The fleet follows retunes through the sweep; after the third tuning phase
/// the client runs the third scenario and is pairing again.
#[test]
fn clients_follow_the_sweep() {
    let bus = Bus::new(0.0, 8);
    let server_link = bus.attach(SERVER);
    let client_link = bus.attach(4);
    let done = AtomicBool::new(false);
    let scenarios = Scenarios::new(sweep()).unwrap();

    let (records, client) = thread::scope(|scope| {
        let done = &done;
        let server = scope.spawn(move || {
            let mut server = Server::new(server_link, Vec::new(), scenarios, server_cfg());
            let start = Instant::now();
            server.run_while(|s| s.cycles() < 3 && start.elapsed() < GIVE_UP);
            done.store(true, Ordering::Relaxed);
            assert_eq!(server.cycles(), 3);
            server.into_sink()
        });

        let mut client = Client::new(client_link, client_cfg()).with_seed(9);
        client.run_while(|_| !done.load(Ordering::Relaxed));
        (server.join().unwrap(), client)
    });

    let channels: Vec<u8> = records.iter().map(|r| r.params.channel).collect();
    assert_eq!(channels, vec![2, 5, 9]);
    assert!(records.iter().all(|r| r.from == 4 && r.report.num_reply > 0));

    assert_eq!(client.radio().params(), sweep()[2]);
    assert_eq!(client.state(), ClientState::Pairing);
}
