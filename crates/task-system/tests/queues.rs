use clb_task_system::{DrainError, Interrupter, JoinFailure, PendingTasks, TaskHandle};

use std::{
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	},
	time::Duration,
};

use thiserror::Error;
use tokio::{sync::oneshot, time::sleep};
use tracing_test::traced_test;

#[derive(Debug, Clone, Error)]
enum SampleError {
	#[error("sample failure <step={0}>")]
	Failed(usize),
	#[error(transparent)]
	Join(#[from] JoinFailure),
}

#[tokio::test]
#[traced_test]
async fn critical_tasks_are_awaited_in_order() {
	let mut pending = PendingTasks::<SampleError>::new();
	let finished = Arc::new(AtomicUsize::new(0));

	for i in 0..5_u64 {
		let finished = Arc::clone(&finished);
		pending.push_critical(TaskHandle::spawn("write", async move {
			sleep(Duration::from_millis(5 * (5 - i))).await;
			finished.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}));
	}

	let awaited = pending
		.await_critical(&Interrupter::new())
		.await
		.expect("no task fails");

	assert_eq!(awaited, 5);
	assert_eq!(finished.load(Ordering::SeqCst), 5);
	assert_eq!(pending.critical_len(), 0);
}

#[tokio::test]
#[traced_test]
async fn first_failure_stops_the_drain() {
	let mut pending = PendingTasks::<SampleError>::new();

	pending.push_critical(TaskHandle::done("ok"));
	let failing = TaskHandle::spawn("fails", async { Err(SampleError::Failed(1)) });
	let failing_id = failing.task_id();
	pending.push_critical(failing);
	pending.push_critical(TaskHandle::done("never awaited"));

	match pending.await_critical(&Interrupter::new()).await {
		Err(DrainError::Failed(failure)) => {
			assert_eq!(failure.task_id, failing_id);
			assert_eq!(failure.name, "fails");
			assert!(matches!(failure.source, SampleError::Failed(1)));
		}
		other => panic!("unexpected drain result: {other:?}"),
	}

	assert_eq!(pending.critical_len(), 1);
}

#[tokio::test]
#[traced_test]
async fn background_tasks_registered_from_other_tasks_are_drained() {
	let pending = PendingTasks::<SampleError>::new();
	let background = pending.background();

	let registrar = TaskHandle::<SampleError>::spawn("registrar", async move {
		for _ in 0..3 {
			background.push(TaskHandle::spawn("aux", async { Ok(()) }));
		}
		Ok(())
	});
	registrar.await.expect("registrar runs");

	assert_eq!(pending.background_len(), 3);
	assert_eq!(
		pending
			.drain_background(&Interrupter::new())
			.await
			.expect("no task fails"),
		3
	);
}

#[tokio::test]
#[traced_test]
async fn interruption_while_waiting_fails_the_drain() {
	let mut pending = PendingTasks::<SampleError>::new();
	let (_never_tx, never_rx) = oneshot::channel::<()>();

	pending.push_critical(TaskHandle::spawn("hangs", async move {
		let _ = never_rx.await;
		Ok(())
	}));
	pending.push_critical(TaskHandle::done("queued"));

	let interrupter = Interrupter::new();
	interrupter.interrupt();

	assert!(matches!(
		pending.await_critical(&interrupter).await,
		Err(DrainError::Interrupted { remaining: 2 })
	));
}

#[tokio::test]
async fn dependent_work_waits_for_completion() {
	let (release_tx, release_rx) = oneshot::channel::<()>();
	let order = Arc::new(AtomicUsize::new(0));

	let first = TaskHandle::<SampleError>::spawn("first", {
		let order = Arc::clone(&order);
		async move {
			let _ = release_rx.await;
			order
				.compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
				.expect("first runs first");
			Ok(())
		}
	});

	let second = TaskHandle::<SampleError>::spawn("second", {
		let after = first.completion();
		let order = Arc::clone(&order);
		async move {
			after.await?;
			order
				.compare_exchange(1, 2, Ordering::SeqCst, Ordering::SeqCst)
				.expect("second runs after first");
			Ok(())
		}
	});

	sleep(Duration::from_millis(10)).await;
	assert_eq!(order.load(Ordering::SeqCst), 0);

	release_tx.send(()).expect("first task is waiting");
	second.await.expect("second task succeeds");
	first.await.expect("first task succeeds");
	assert_eq!(order.load(Ordering::SeqCst), 2);
}
