use clb_importer::{
	backend::{in_memory, MemoryStore},
	graph::GraphBuilder,
	listener::{ImporterEvent, ImporterMessage, ImporterService, MemoryGraphProvider},
	ImporterConfig,
};

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_channel as chan;
use pretty_assertions::assert_eq;
use tracing_test::traced_test;
use uuid::Uuid;

mod common;

use common::{assert_index_mirrors_store, Pinaceae};

fn provider_with(datasets: &[Uuid]) -> Arc<MemoryGraphProvider> {
	let provider = Arc::new(MemoryGraphProvider::new());
	for &dataset_key in datasets {
		let mut builder = GraphBuilder::new();
		Pinaceae::add_to(&mut builder);
		provider.insert(dataset_key, builder.build().expect("valid graph"));
	}
	provider
}

fn drain(events_rx: &chan::Receiver<ImporterEvent>) -> HashMap<Uuid, ImporterEvent> {
	let mut events = HashMap::new();
	while let Ok(event) = events_rx.try_recv() {
		events.insert(event.dataset_key(), event);
	}
	events
}

#[tokio::test]
#[traced_test]
async fn normalized_checklists_are_synced() {
	let datasets = [Uuid::new_v4(), Uuid::new_v4()];
	let unknown = Uuid::new_v4();

	let store = MemoryStore::new();
	let (importer, index) = in_memory(ImporterConfig::default(), &store);
	let provider = provider_with(&datasets);
	let (service, events_rx) = ImporterService::new(Arc::new(importer), provider.clone());

	let (msg_tx, msg_rx) = chan::unbounded();
	for dataset_key in datasets.iter().copied().chain([unknown]) {
		msg_tx
			.send(ImporterMessage::ChecklistNormalized { dataset_key })
			.await
			.expect("service listening");
	}
	drop(msg_tx);

	service.run(msg_rx).await;

	let events = drain(&events_rx);
	assert_eq!(events.len(), 3);

	for dataset_key in datasets {
		match &events[&dataset_key] {
			ImporterEvent::ChecklistSynced { report, .. } => {
				assert_eq!(report.main, Pinaceae::LEN);
			}
			other => panic!("unexpected event: {other:?}"),
		}
		assert_eq!(store.usages(dataset_key).len(), Pinaceae::LEN);
		assert_index_mirrors_store(&store, &index, dataset_key);
	}

	assert!(matches!(
		&events[&unknown],
		ImporterEvent::ImportFailed { cause, .. } if cause.contains("no normalized graph")
	));

	assert_eq!(service.started(), 3);
	assert_eq!(service.failed(), 1);
	assert!(service.processing_time() > Duration::ZERO);
	assert!(provider.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[traced_test]
async fn datasets_are_imported_concurrently() {
	let datasets = (0..4).map(|_| Uuid::new_v4()).collect::<Vec<_>>();

	let store = MemoryStore::new();
	let config = ImporterConfig {
		msg_pool_size: 2,
		..Default::default()
	};
	let (importer, index) = in_memory(config, &store);
	let (service, events_rx) =
		ImporterService::new(Arc::new(importer), provider_with(&datasets));

	let (msg_tx, msg_rx) = chan::bounded(1);
	let producer = tokio::spawn({
		let datasets = datasets.clone();
		async move {
			for dataset_key in datasets {
				msg_tx
					.send(ImporterMessage::ChecklistNormalized { dataset_key })
					.await
					.expect("service listening");
			}
		}
	});

	service.run(msg_rx).await;
	producer.await.expect("producer finished");

	let events = drain(&events_rx);
	assert_eq!(events.len(), datasets.len());
	assert!(events
		.values()
		.all(|event| matches!(event, ImporterEvent::ChecklistSynced { .. })));

	for dataset_key in datasets {
		assert_index_mirrors_store(&store, &index, dataset_key);
	}
	assert_eq!(service.failed(), 0);
}

#[tokio::test]
#[traced_test]
async fn interrupted_service_fails_its_imports() {
	let dataset_key = Uuid::new_v4();
	let store = MemoryStore::new();
	let (importer, _index) = in_memory(ImporterConfig::default(), &store);
	let (service, events_rx) =
		ImporterService::new(Arc::new(importer), provider_with(&[dataset_key]));

	service.interrupter().interrupt();

	let (msg_tx, msg_rx) = chan::unbounded();
	msg_tx
		.send(ImporterMessage::ChecklistNormalized { dataset_key })
		.await
		.expect("service listening");
	drop(msg_tx);

	service.run(msg_rx).await;

	assert!(matches!(
		events_rx.try_recv(),
		Ok(ImporterEvent::ImportFailed { cause, .. }) if cause.contains("interrupted")
	));
	assert_eq!(service.failed(), 1);
}
