use std::env;
use std::sync::Arc;
use std::time::Duration;

use snafu::{OptionExt, Snafu};
use tokio::sync::mpsc;

use wetalk::{ChatSession, ClientSettings, ComposeError, StoreUpdate};
use wetalk_directory::{InMemoryDirectory, UserId, UserProfile};
use wetalk_transport::{
    ChannelTransport, EVENT_MESSAGE, Frame, MessagePayload, PayloadKind, RemoteEnd, SendPayload,
    TransportEvent,
};

const APPEND_DEADLINE: Duration = Duration::from_secs(2);

const LOCAL_USER: u64 = 3;
const PEER_ALICE: u64 = 7;
const PEER_BOB: u64 = 8;

#[derive(Debug, Clone)]
struct RunnerArgs {
    scenario: Scenario,
}

#[derive(Debug, Clone, Copy)]
enum Scenario {
    MessageFlow,
    InterleavedPeers,
    MalformedPayload,
    DraftValidation,
    LocalEcho,
    StopDetach,
    All,
}

impl Scenario {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "message_flow" => Some(Self::MessageFlow),
            "interleaved_peers" => Some(Self::InterleavedPeers),
            "malformed_payload" => Some(Self::MalformedPayload),
            "draft_validation" => Some(Self::DraftValidation),
            "local_echo" => Some(Self::LocalEcho),
            "stop_detach" => Some(Self::StopDetach),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::MessageFlow => "message_flow",
            Self::InterleavedPeers => "interleaved_peers",
            Self::MalformedPayload => "malformed_payload",
            Self::DraftValidation => "draft_validation",
            Self::LocalEcho => "local_echo",
            Self::StopDetach => "stop_detach",
            Self::All => "all",
        }
    }
}

#[derive(Debug, Snafu)]
enum RunnerError {
    #[snafu(display("missing required --scenario argument"))]
    MissingScenario { stage: &'static str },
    #[snafu(display("missing value for argument '{arg}'"))]
    MissingArgumentValue {
        stage: &'static str,
        arg: &'static str,
    },
    #[snafu(display("unknown scenario '{raw}'"))]
    UnknownScenario { stage: &'static str, raw: String },
    #[snafu(display("unknown argument '{raw}'"))]
    UnknownArgument { stage: &'static str, raw: String },
    #[snafu(display("scenario '{scenario}' failed: {reason}"))]
    ScenarioFailed {
        stage: &'static str,
        scenario: &'static str,
        reason: String,
    },
}

type RunnerResult<T> = Result<T, RunnerError>;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt::init();

    if let Err(error) = run().await {
        println!("runner_ok=false");
        eprintln!("runner_error={error}");
        std::process::exit(1);
    }
}

async fn run() -> RunnerResult<()> {
    let args = parse_args(env::args().skip(1))?;
    println!("scenario={}", args.scenario.name());

    match args.scenario {
        Scenario::MessageFlow => run_message_flow().await,
        Scenario::InterleavedPeers => run_interleaved_peers().await,
        Scenario::MalformedPayload => run_malformed_payload().await,
        Scenario::DraftValidation => run_draft_validation().await,
        Scenario::LocalEcho => run_local_echo().await,
        Scenario::StopDetach => run_stop_detach().await,
        Scenario::All => run_all().await,
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> RunnerResult<RunnerArgs> {
    let mut scenario = None;
    let mut pending = args.into_iter();

    while let Some(argument) = pending.next() {
        match argument.as_str() {
            "--scenario" => {
                let value = pending.next().context(MissingArgumentValueSnafu {
                    stage: "parse-args-scenario-value",
                    arg: "--scenario",
                })?;

                let parsed = Scenario::parse(&value).context(UnknownScenarioSnafu {
                    stage: "parse-args-scenario",
                    raw: value,
                })?;
                scenario = Some(parsed);
            }
            _ => {
                return UnknownArgumentSnafu {
                    stage: "parse-args",
                    raw: argument,
                }
                .fail();
            }
        }
    }

    Ok(RunnerArgs {
        scenario: scenario.context(MissingScenarioSnafu {
            stage: "parse-args-scenario-required",
        })?,
    })
}

struct Harness {
    session: ChatSession,
    remote: RemoteEnd,
    appended: mpsc::UnboundedReceiver<StoreUpdate>,
}

fn harness(settings: ClientSettings) -> Harness {
    let directory = InMemoryDirectory::new()
        .with_current_user(UserProfile::new(UserId::new(LOCAL_USER), "local"))
        .with_contact(UserProfile::new(UserId::new(PEER_ALICE), "alice"))
        .with_contact(UserProfile::new(UserId::new(PEER_BOB), "bob"));

    let (transport, events, remote) = ChannelTransport::pair();
    let mut session = ChatSession::new(
        Arc::new(directory),
        Arc::new(transport),
        UserId::new(LOCAL_USER),
        &settings,
    );
    session.start(events);

    let (tx, appended) = mpsc::unbounded_channel();
    session.store().subscribe(move |update| {
        let _ = tx.send(update.clone());
    });

    Harness {
        session,
        remote,
        appended,
    }
}

fn plain_text(id: u64, from: u64, to: u64, content: &str) -> MessagePayload {
    MessagePayload {
        id,
        from,
        to,
        kind: PayloadKind::PlainText,
        content: content.to_string(),
    }
}

fn check(condition: bool, scenario: &'static str, reason: &str) -> RunnerResult<()> {
    if condition {
        Ok(())
    } else {
        ScenarioFailedSnafu {
            stage: "scenario-check",
            scenario,
            reason: reason.to_string(),
        }
        .fail()
    }
}

async fn await_append(
    harness: &mut Harness,
    scenario: &'static str,
) -> RunnerResult<StoreUpdate> {
    tokio::time::timeout(APPEND_DEADLINE, harness.appended.recv())
        .await
        .ok()
        .flatten()
        .context(ScenarioFailedSnafu {
            stage: "scenario-await-append",
            scenario,
            reason: "no store append arrived within the deadline".to_string(),
        })
}

async fn run_message_flow() -> RunnerResult<()> {
    const SCENARIO: &str = "message_flow";
    let mut harness = harness(ClientSettings::default());
    harness.session.select_peer(UserId::new(PEER_ALICE));

    let initial = harness.session.view();
    check(
        initial.as_ref().is_some_and(|view| view.scroll_to_latest),
        SCENARIO,
        "selecting a conversation must arm the scroll cue",
    )?;

    harness
        .remote
        .deliver_message(&plain_text(1, PEER_ALICE, LOCAL_USER, "hi"))
        .map_err(|error| {
            ScenarioFailedSnafu {
                stage: "scenario-deliver",
                scenario: SCENARIO,
                reason: error.to_string(),
            }
            .build()
        })?;
    let update = await_append(&mut harness, SCENARIO).await?;
    check(
        update.peer == UserId::new(PEER_ALICE),
        SCENARIO,
        "inbound message must be keyed by its sender",
    )?;

    let view = harness.session.view().context(ScenarioFailedSnafu {
        stage: "scenario-view",
        scenario: SCENARIO,
        reason: "a peer is selected, so a snapshot must exist".to_string(),
    })?;
    check(view.items.len() == 1, SCENARIO, "exactly one projected row")?;
    check(
        !view.items[0].receive,
        SCENARIO,
        "a peer-authored message projects with receive=false",
    )?;
    check(
        view.items[0]
            .profile
            .as_ref()
            .is_some_and(|profile| profile.nickname == "alice"),
        SCENARIO,
        "the sender profile resolves through the directory",
    )?;
    check(view.scroll_to_latest, SCENARIO, "tail change fires the cue")?;
    check(
        !harness
            .session
            .view()
            .is_some_and(|view| view.scroll_to_latest),
        SCENARIO,
        "the cue fires exactly once per change",
    )?;

    harness.session.set_draft("hello back");
    harness.session.submit().map_err(|error| {
        ScenarioFailedSnafu {
            stage: "scenario-submit",
            scenario: SCENARIO,
            reason: error.to_string(),
        }
        .build()
    })?;
    let frame = harness.remote.try_next_sent().context(ScenarioFailedSnafu {
        stage: "scenario-captured-send",
        scenario: SCENARIO,
        reason: "submit must emit exactly one frame".to_string(),
    })?;
    let sent: SendPayload = serde_json::from_value(frame.payload).map_err(|error| {
        ScenarioFailedSnafu {
            stage: "scenario-decode-send",
            scenario: SCENARIO,
            reason: error.to_string(),
        }
        .build()
    })?;
    check(
        sent.to == PEER_ALICE && sent.content == "hello back",
        SCENARIO,
        "the emitted payload targets the selected peer verbatim",
    )?;
    check(
        harness.session.draft().is_empty(),
        SCENARIO,
        "the draft resets optimistically after emission",
    )?;

    harness.session.stop().await;
    println!("message_flow=true");
    println!("runner_ok=true");
    Ok(())
}

async fn run_interleaved_peers() -> RunnerResult<()> {
    const SCENARIO: &str = "interleaved_peers";
    let mut harness = harness(ClientSettings::default());

    for (id, from, content) in [
        (1, PEER_ALICE, "a1"),
        (2, PEER_BOB, "b1"),
        (3, PEER_ALICE, "a2"),
        (4, PEER_BOB, "b2"),
    ] {
        harness
            .remote
            .deliver_message(&plain_text(id, from, LOCAL_USER, content))
            .map_err(|error| {
                ScenarioFailedSnafu {
                    stage: "scenario-deliver",
                    scenario: SCENARIO,
                    reason: error.to_string(),
                }
                .build()
            })?;
        await_append(&mut harness, SCENARIO).await?;
    }

    let store = harness.session.store();
    let alice: Vec<String> = store
        .get(UserId::new(PEER_ALICE))
        .into_iter()
        .map(|message| message.content)
        .collect();
    let bob: Vec<String> = store
        .get(UserId::new(PEER_BOB))
        .into_iter()
        .map(|message| message.content)
        .collect();

    check(alice == ["a1", "a2"], SCENARIO, "alice keeps arrival order")?;
    check(bob == ["b1", "b2"], SCENARIO, "bob keeps arrival order")?;

    harness.session.stop().await;
    println!("interleaved_peers=true");
    println!("runner_ok=true");
    Ok(())
}

async fn run_malformed_payload() -> RunnerResult<()> {
    const SCENARIO: &str = "malformed_payload";
    let mut harness = harness(ClientSettings::default());

    let malformed = Frame::new(
        EVENT_MESSAGE,
        serde_json::json!({ "id": 1, "from": PEER_ALICE, "to": LOCAL_USER }),
    );
    harness
        .remote
        .deliver(TransportEvent::Frame(malformed))
        .map_err(|error| {
            ScenarioFailedSnafu {
                stage: "scenario-deliver",
                scenario: SCENARIO,
                reason: error.to_string(),
            }
            .build()
        })?;
    harness
        .remote
        .deliver_message(&plain_text(2, PEER_ALICE, LOCAL_USER, "still flowing"))
        .map_err(|error| {
            ScenarioFailedSnafu {
                stage: "scenario-deliver",
                scenario: SCENARIO,
                reason: error.to_string(),
            }
            .build()
        })?;

    let update = await_append(&mut harness, SCENARIO).await?;
    check(
        update.message.content == "still flowing",
        SCENARIO,
        "only the well-formed payload lands",
    )?;
    check(
        harness.session.store().get(UserId::new(PEER_ALICE)).len() == 1,
        SCENARIO,
        "the malformed payload never reaches the store",
    )?;

    harness.session.stop().await;
    println!("malformed_payload=true");
    println!("runner_ok=true");
    Ok(())
}

async fn run_draft_validation() -> RunnerResult<()> {
    const SCENARIO: &str = "draft_validation";
    let mut harness = harness(ClientSettings::default());
    harness.session.select_peer(UserId::new(PEER_ALICE));

    harness.session.set_draft("   ");
    let rejected = harness.session.submit();
    check(
        rejected == Err(ComposeError::EmptyDraft),
        SCENARIO,
        "whitespace-only drafts are rejected",
    )?;
    check(
        harness.session.draft() == "   ",
        SCENARIO,
        "a rejected draft is preserved",
    )?;
    check(
        harness.remote.try_next_sent().is_none(),
        SCENARIO,
        "nothing is emitted for a rejected draft",
    )?;

    harness.session.stop().await;
    println!("draft_validation=true");
    println!("runner_ok=true");
    Ok(())
}

async fn run_local_echo() -> RunnerResult<()> {
    const SCENARIO: &str = "local_echo";
    let mut harness = harness(ClientSettings {
        local_echo: true,
        ..ClientSettings::default()
    });
    harness.session.select_peer(UserId::new(PEER_ALICE));

    harness.session.set_draft("optimistic");
    harness.session.submit().map_err(|error| {
        ScenarioFailedSnafu {
            stage: "scenario-submit",
            scenario: SCENARIO,
            reason: error.to_string(),
        }
        .build()
    })?;

    let stored = harness.session.store().get(UserId::new(PEER_ALICE));
    check(
        stored.len() == 1 && stored[0].id.is_local_echo(),
        SCENARIO,
        "the echo copy lands immediately with a locally minted id",
    )?;

    harness.session.stop().await;
    println!("local_echo=true");
    println!("runner_ok=true");
    Ok(())
}

async fn run_stop_detach() -> RunnerResult<()> {
    const SCENARIO: &str = "stop_detach";
    let mut harness = harness(ClientSettings::default());

    harness
        .remote
        .deliver_message(&plain_text(1, PEER_ALICE, LOCAL_USER, "kept"))
        .map_err(|error| {
            ScenarioFailedSnafu {
                stage: "scenario-deliver",
                scenario: SCENARIO,
                reason: error.to_string(),
            }
            .build()
        })?;
    await_append(&mut harness, SCENARIO).await?;

    harness.session.stop().await;

    let link_released = harness
        .remote
        .deliver_message(&plain_text(2, PEER_ALICE, LOCAL_USER, "dropped"))
        .is_err();
    check(
        link_released,
        SCENARIO,
        "stop must release the inbound subscription with the worker",
    )?;
    check(
        harness.session.store().get(UserId::new(PEER_ALICE)).len() == 1,
        SCENARIO,
        "no event reaches the store after stop returns",
    )?;

    println!("stop_detach=true");
    println!("runner_ok=true");
    Ok(())
}

async fn run_all() -> RunnerResult<()> {
    run_message_flow().await?;
    run_interleaved_peers().await?;
    run_malformed_payload().await?;
    run_draft_validation().await?;
    run_local_echo().await?;
    run_stop_detach().await?;
    println!("all=true");
    Ok(())
}
