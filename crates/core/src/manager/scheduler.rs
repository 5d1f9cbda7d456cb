//! Background machinery: the search queue worker and the periodic tasks.
//!
//! Each task runs in its own spawned loop, waking on its configured
//! interval and bailing out on the shutdown broadcast. Task bodies isolate
//! their own errors; a failing item never stops its siblings.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::library::MediaType;

use super::{Manager, QUEUE_ITEM_DELAY};

impl Manager {
    /// Start the queue worker and every scheduled task, then kick off an
    /// immediate pending sweep and RSS pass so a fresh process does not idle
    /// until the first tick.
    pub async fn start(self: &Arc<Self>) {
        self.spawn_queue_worker();

        let scheduler = &self.config.scheduler;
        self.spawn_task(
            "process_pending",
            Duration::from_secs(scheduler.process_pending_secs),
            |m| async move { m.process_pending_media().await },
        );
        self.spawn_task(
            "check_new_episodes",
            Duration::from_secs(scheduler.check_new_episodes_secs),
            |m| async move { m.check_for_new_episodes().await },
        );
        self.spawn_task(
            "update_download_status",
            Duration::from_secs(scheduler.download_poll_secs),
            |m| async move { m.update_download_status().await },
        );
        self.spawn_task(
            "rss_sweep",
            Duration::from_secs(scheduler.rss_sweep_secs),
            |m| async move { m.process_rss_feeds().await },
        );
        self.spawn_task(
            "torrent_cleanup",
            Duration::from_secs(scheduler.torrent_cleanup_secs),
            |m| async move { m.cleanup_completed_torrents().await },
        );
        self.spawn_task(
            "retry_failed",
            Duration::from_secs(scheduler.retry_failed_secs),
            |m| async move { m.retry_failed_downloads().await },
        );
        info!("Scheduler started");

        let startup = Arc::clone(self);
        tokio::spawn(async move {
            startup.process_pending_media().await;
            startup.process_rss_feeds().await;
        });
    }

    /// Signal every background loop to stop. In-flight queue work finishes
    /// before the worker exits.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    fn spawn_task<F, Fut>(self: &Arc<Self>, name: &'static str, interval: Duration, body: F)
    where
        F: Fn(Arc<Manager>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let manager = Arc::clone(self);
        let mut shutdown = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!(task = name, "Scheduled task started");
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = tokio::time::sleep(interval) => {
                        body(Arc::clone(&manager)).await;
                    }
                }
            }
            info!(task = name, "Scheduled task stopped");
        });
    }

    /// The single queue consumer: strictly FIFO, strictly serial, with a
    /// cool-down between items.
    fn spawn_queue_worker(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        let mut shutdown = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut queue_rx = manager
                .queue_rx
                .lock()
                .await
                .take()
                .expect("queue worker started twice");

            info!("Search queue worker started");
            loop {
                let media = tokio::select! {
                    _ = shutdown.recv() => break,
                    received = queue_rx.recv() => match received {
                        Some(media) => media,
                        None => break,
                    },
                };

                match media.media_type {
                    MediaType::Movie => manager.search_and_download_movie(&media).await,
                    MediaType::TvShow | MediaType::Anime => {
                        manager.search_and_download_next_episode(&media).await
                    }
                }

                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = tokio::time::sleep(QUEUE_ITEM_DELAY) => {}
                }
            }
            info!("Search queue worker stopped");
        });
    }
}
