//! Middleware pipeline tests

use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use crate::protocol::headers;

struct PassThrough;
struct HaltAll;

#[async_trait]
impl Interceptor for PassThrough {
    async fn intercept(&self, _session: &Arc<Session>, _frame: &mut Frame) -> Flow {
        Flow::Continue
    }
}

#[async_trait]
impl Interceptor for HaltAll {
    async fn intercept(&self, _session: &Arc<Session>, _frame: &mut Frame) -> Flow {
        Flow::Halt
    }
}

/// Counts invocations and tags the frame with its label
struct Recorder {
    label: &'static str,
    calls: AtomicUsize,
}

impl Recorder {
    fn new(label: &'static str) -> Arc<Self> {
        Arc::new(Self {
            label,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Interceptor for Recorder {
    async fn intercept(&self, _session: &Arc<Session>, frame: &mut Frame) -> Flow {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut trail = frame.headers.get("trail").unwrap_or("").to_string();
        trail.push_str(self.label);
        frame.headers.set("trail", trail);
        Flow::Continue
    }
}

fn send_frame() -> Frame {
    Frame::new("SEND").header(headers::DESTINATION, "/t")
}

#[tokio::test]
async fn empty_chain_continues() {
    let pipeline = Pipeline::new();
    let session = Session::pseudo("self_test");
    let mut frame = send_frame();
    assert_eq!(
        pipeline.dispatch(Command::Send, &session, &mut frame).await,
        Flow::Continue
    );
}

#[tokio::test]
async fn interceptors_run_in_registration_order() {
    let pipeline = Pipeline::new();
    pipeline.add(Command::Send, Recorder::new("a"));
    pipeline.add(Command::Send, Recorder::new("b"));
    pipeline.add(Command::Send, Recorder::new("c"));

    let session = Session::pseudo("self_test");
    let mut frame = send_frame();
    let flow = pipeline.dispatch(Command::Send, &session, &mut frame).await;

    assert_eq!(flow, Flow::Continue);
    assert_eq!(frame.headers.get("trail"), Some("abc"));
}

#[tokio::test]
async fn halt_stops_the_chain() {
    let pipeline = Pipeline::new();
    let before = Recorder::new("x");
    let after = Recorder::new("y");
    pipeline.add(Command::Send, before.clone());
    pipeline.add(Command::Send, Arc::new(HaltAll));
    pipeline.add(Command::Send, after.clone());

    let session = Session::pseudo("self_test");
    let mut frame = send_frame();
    let flow = pipeline.dispatch(Command::Send, &session, &mut frame).await;

    assert_eq!(flow, Flow::Halt);
    assert_eq!(before.calls.load(Ordering::SeqCst), 1);
    assert_eq!(after.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn chains_are_per_command() {
    let pipeline = Pipeline::new();
    pipeline.add(Command::Send, Arc::new(HaltAll));

    let session = Session::pseudo("self_test");
    let mut frame = Frame::new("SUBSCRIBE");
    assert_eq!(
        pipeline
            .dispatch(Command::Subscribe, &session, &mut frame)
            .await,
        Flow::Continue
    );
}

#[tokio::test]
async fn set_replaces_the_chain() {
    let pipeline = Pipeline::new();
    pipeline.add(Command::Send, Arc::new(HaltAll));
    pipeline.add(Command::Send, Arc::new(HaltAll));
    assert_eq!(pipeline.len(Command::Send), 2);

    pipeline.set(Command::Send, Arc::new(PassThrough));
    assert_eq!(pipeline.len(Command::Send), 1);

    let session = Session::pseudo("self_test");
    let mut frame = send_frame();
    assert_eq!(
        pipeline.dispatch(Command::Send, &session, &mut frame).await,
        Flow::Continue
    );
}

#[tokio::test]
async fn remove_drops_first_matching_instance() {
    let pipeline = Pipeline::new();
    let halt: Arc<dyn Interceptor> = Arc::new(HaltAll);
    pipeline.add(Command::Send, Arc::new(PassThrough));
    pipeline.add(Command::Send, halt.clone());

    assert!(pipeline.remove(Command::Send, &halt));
    assert!(!pipeline.remove(Command::Send, &halt));
    assert_eq!(pipeline.len(Command::Send), 1);

    let session = Session::pseudo("self_test");
    let mut frame = send_frame();
    assert_eq!(
        pipeline.dispatch(Command::Send, &session, &mut frame).await,
        Flow::Continue
    );
}
