//! Overlay behavior driven through the page agent with a hand-fed background.

mod common;

use std::rc::Rc;

use common::{Harness, SENTENCE, settle};
use honyaku_page::{
    CorrectionError, Document, Overlay, OverlayState, Severity, SubStreamKind, SubStreamStatus,
    TriggerOutcome,
};
use honyaku_types::{ClientToBackground, StreamEvent};
use tokio::task::LocalSet;

use SubStreamKind::{Explanation, Translation};

fn word(outcome: TriggerOutcome) -> Rc<Overlay> {
    match outcome {
        TriggerOutcome::Word(overlay) => overlay,
        other => panic!("expected word overlay, got {other:?}"),
    }
}

fn paragraph(outcome: TriggerOutcome) -> Rc<Overlay> {
    match outcome {
        TriggerOutcome::Paragraph(overlay) => overlay,
        other => panic!("expected paragraph overlay, got {other:?}"),
    }
}

fn cancelled(posted: &[ClientToBackground]) -> Vec<honyaku_types::RequestTag> {
    posted
        .iter()
        .filter_map(|m| match m {
            ClientToBackground::CancelStream { tag } => Some(*tag),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn word_popup_renders_both_regions_in_order() {
    LocalSet::new()
        .run_until(async {
            let mut h = Harness::new();
            let popup = word(h.trigger("gato").await);
            let tags = h.started();
            assert_eq!(tags.len(), 2);
            let (t, e) = (tags[0], tags[1]);
            assert_eq!(popup.tags(), tags);

            h.emit([
                StreamEvent::delta(t, "the "),
                StreamEvent::delta(e, "Noun, "),
                StreamEvent::delta(t, "cat"),
                StreamEvent::delta(e, "masculine."),
                StreamEvent::done(t, "the cat"),
                StreamEvent::done(e, "Noun, masculine."),
            ])
            .await;

            assert_eq!(h.text_of(popup.slot(Translation)), "the cat");
            assert_eq!(h.text_of(popup.slot(Explanation)), "Noun, masculine.");
            assert_eq!(popup.status(Translation), Some(SubStreamStatus::Done));
            assert_eq!(popup.state(), OverlayState::Finalized);
            let slot = popup.slot(Translation).unwrap();
            assert_eq!(h.doc.attribute(slot, "data-state").as_deref(), Some("done"));
            assert!(h.toasts.0.borrow().is_empty());

            // Anything after the terminal event is ignored.
            h.emit([StreamEvent::delta(t, " again")]).await;
            assert_eq!(h.text_of(popup.slot(Translation)), "the cat");
        })
        .await;
}

#[tokio::test]
async fn dismiss_cancels_open_streams_and_freezes_the_page() {
    LocalSet::new()
        .run_until(async {
            let mut h = Harness::new();
            let popup = word(h.trigger("gato").await);
            let tags = h.started();
            h.emit([StreamEvent::delta(tags[0], "the"), StreamEvent::delta(tags[1], "Noun")]).await;

            assert!(h.orchestrator.dismiss());
            assert_eq!(popup.state(), OverlayState::Destroyed);
            assert!(!h.doc.is_connected(popup.root()));
            let mut cancels = cancelled(&h.posted());
            cancels.sort();
            let mut expected = tags.clone();
            expected.sort();
            assert_eq!(cancels, expected);

            let before = h.doc.mutation_count();
            h.emit([
                StreamEvent::delta(tags[0], " cat"),
                StreamEvent::done(tags[0], "the cat"),
                StreamEvent::error(tags[1], "late", None),
            ])
            .await;
            assert_eq!(h.doc.mutation_count(), before);
            assert!(h.toasts.0.borrow().is_empty());

            // Second dismissal has nothing to do and posts nothing.
            assert!(!h.orchestrator.dismiss());
            assert!(h.posted().is_empty());
        })
        .await;
}

#[tokio::test]
async fn only_one_popup_is_ever_visible() {
    LocalSet::new()
        .run_until(async {
            let h = Harness::new();
            let mut seen = Vec::new();
            for w in ["gato", "negro", "silla", "cocina"] {
                let popup = word(h.trigger(w).await);
                assert_eq!(h.doc.find_by_class("honyaku-popup"), vec![popup.root()]);
                assert!(seen.iter().all(|p: &Rc<Overlay>| p.state() == OverlayState::Destroyed));
                seen.push(popup);
            }
            let current = h.orchestrator.overlays().current_popup().map(|p| p.id());
            assert_eq!(current, seen.last().map(|p| p.id()));
        })
        .await;
}

#[tokio::test]
async fn rapid_word_requests_do_not_cross_talk() {
    LocalSet::new()
        .run_until(async {
            let mut h = Harness::new();
            let first = word(h.trigger("gato").await);
            let a = h.started();
            let second = word(h.trigger("negro").await);
            let posted = h.posted();

            let mut cancels = cancelled(&posted);
            cancels.sort();
            let mut expected = a.clone();
            expected.sort();
            assert_eq!(cancels, expected);
            let b: Vec<_> = posted
                .iter()
                .filter_map(|m| match m {
                    ClientToBackground::StartStream { tag, .. } => Some(*tag),
                    _ => None,
                })
                .collect();
            assert_eq!(b.len(), 2);
            assert!(b.iter().all(|tag| !a.contains(tag)));

            // The relay was slow to notice the cancel: old events still arrive.
            h.emit([
                StreamEvent::delta(a[0], "the cat"),
                StreamEvent::delta(b[0], "black"),
                StreamEvent::delta(a[1], "Noun"),
                StreamEvent::delta(b[1], "Adjective"),
                StreamEvent::done(a[0], "the cat"),
                StreamEvent::done(b[0], "black"),
                StreamEvent::done(b[1], "Adjective"),
            ])
            .await;

            assert_eq!(first.state(), OverlayState::Destroyed);
            assert_eq!(h.text_of(first.slot(Translation)), "");
            assert_eq!(h.text_of(second.slot(Translation)), "black");
            assert_eq!(h.text_of(second.slot(Explanation)), "Adjective");
            assert_eq!(second.state(), OverlayState::Finalized);
        })
        .await;
}

#[tokio::test]
async fn slow_correction_loses_to_a_later_word() {
    LocalSet::new()
        .run_until(async {
            let mut h = Harness::new();
            let release = h.corrector.hold_next();
            h.select("gato");
            let orchestrator = h.orchestrator.clone();
            let stale = tokio::task::spawn_local(async move { orchestrator.trigger().await });
            settle().await;

            let newer = word(h.trigger("negro").await);
            release.send(()).unwrap();
            let stale = stale.await.unwrap();
            assert!(matches!(stale, TriggerOutcome::Superseded), "got {stale:?}");

            assert!(newer.is_visible());
            let current = h.orchestrator.overlays().current_popup().unwrap();
            assert_eq!(current.id(), newer.id());
            assert_eq!(h.doc.text_content(current.anchor()), "negro");
            assert_eq!(h.doc.find_by_class("honyaku-word").len(), 1);
            assert_eq!(h.started(), newer.tags());
            assert!(cancelled(&h.posted()).is_empty());
        })
        .await;
}

#[tokio::test]
async fn dismiss_during_correction_opens_nothing() {
    LocalSet::new()
        .run_until(async {
            let mut h = Harness::new();
            let release = h.corrector.hold_next();
            h.select("gato");
            let orchestrator = h.orchestrator.clone();
            let pending = tokio::task::spawn_local(async move { orchestrator.trigger().await });
            settle().await;

            h.orchestrator.dismiss();
            release.send(()).unwrap();
            assert!(matches!(pending.await.unwrap(), TriggerOutcome::Superseded));
            assert!(h.orchestrator.overlays().current_popup().is_none());
            assert!(h.posted().is_empty());
        })
        .await;
}

#[tokio::test]
async fn paragraph_translation_survives_anchor_removal() {
    LocalSet::new()
        .run_until(async {
            let mut h = Harness::new();
            h.select_paragraph();
            let block = paragraph(h.orchestrator.trigger().await);
            let tags = h.started();
            assert_eq!(tags.len(), 1);
            assert_eq!(block.kinds(), vec![Translation]);

            let article = h.doc.parent(h.paragraph).unwrap();
            assert_eq!(h.doc.children(article), vec![h.paragraph, block.root()]);
            assert!(h.doc.find_by_class("honyaku-placeholder").is_empty());

            h.emit([StreamEvent::delta(tags[0], "The black cat")]).await;
            h.doc.remove(h.paragraph);
            h.emit([
                StreamEvent::delta(tags[0], " sleeps."),
                StreamEvent::done(tags[0], "The black cat sleeps."),
            ])
            .await;

            assert!(block.is_anchor_lost());
            assert!(h.doc.is_connected(block.root()));
            assert_eq!(h.text_of(block.slot(Translation)), "The black cat sleeps.");
            assert_eq!(block.state(), OverlayState::Finalized);
        })
        .await;
}

#[tokio::test]
async fn retriggered_paragraph_replaces_its_block() {
    LocalSet::new()
        .run_until(async {
            let mut h = Harness::new();
            h.select_paragraph();
            let first = paragraph(h.orchestrator.trigger().await);
            let old = h.started();
            let popup = word(h.trigger("gato").await);
            h.started();

            h.select_paragraph();
            let second = paragraph(h.orchestrator.trigger().await);
            assert_eq!(first.state(), OverlayState::Destroyed);
            assert_eq!(h.doc.find_by_class("honyaku-paragraph"), vec![second.root()]);
            assert!(cancelled(&h.posted()).contains(&old[0]));

            // Paragraph blocks and the popup slot are independent.
            assert!(popup.is_visible());
        })
        .await;
}

#[tokio::test]
async fn failed_region_clears_while_sibling_keeps_streaming() {
    LocalSet::new()
        .run_until(async {
            let mut h = Harness::new();
            let popup = word(h.trigger("gato").await);
            let tags = h.started();

            h.emit([
                StreamEvent::delta(tags[0], "the"),
                StreamEvent::error(tags[1], "upstream returned HTTP 500", None),
            ])
            .await;
            assert_eq!(popup.status(Explanation), Some(SubStreamStatus::Cleared));
            assert_eq!(h.text_of(popup.slot(Explanation)), "");
            assert_eq!(popup.status(Translation), Some(SubStreamStatus::Streaming));
            assert!(popup.is_visible());
            {
                let toasts = h.toasts.0.borrow();
                assert_eq!(toasts.len(), 1);
                assert_eq!(toasts[0].1, Severity::Error);
                assert!(toasts[0].0.contains("HTTP 500"));
            }

            h.emit([StreamEvent::delta(tags[0], " cat"), StreamEvent::done(tags[0], "the cat")]).await;
            assert_eq!(h.text_of(popup.slot(Translation)), "the cat");
            assert_eq!(popup.state(), OverlayState::Finalized);
        })
        .await;
}

#[tokio::test]
async fn error_after_partial_text_clears_the_region() {
    LocalSet::new()
        .run_until(async {
            let mut h = Harness::new();
            let popup = word(h.trigger("gato").await);
            let tags = h.started();

            h.emit([
                StreamEvent::delta(tags[0], "the c"),
                StreamEvent::delta(tags[1], "Noun"),
                StreamEvent::error(tags[0], "stream idle for 30s", None),
            ])
            .await;
            assert_eq!(popup.status(Translation), Some(SubStreamStatus::Cleared));
            assert_eq!(h.text_of(popup.slot(Translation)), "");
            assert_eq!(popup.status(Explanation), Some(SubStreamStatus::Streaming));
            assert_eq!(h.text_of(popup.slot(Explanation)), "Noun");
            assert!(popup.is_visible());

            // Late chunks for the failed sub-stream do not bring text back.
            h.emit([StreamEvent::delta(tags[0], "at"), StreamEvent::done(tags[1], "Noun")]).await;
            assert_eq!(h.text_of(popup.slot(Translation)), "");
            assert_eq!(popup.state(), OverlayState::Finalized);
        })
        .await;
}

#[tokio::test]
async fn quota_code_raises_quota_notice() {
    LocalSet::new()
        .run_until(async {
            let mut h = Harness::new();
            let _popup = word(h.trigger("gato").await);
            let tags = h.started();

            h.emit([StreamEvent::error(tags[1], "limit reached", Some(3001))]).await;
            let toasts = h.toasts.0.borrow();
            assert_eq!(toasts.as_slice(), &[("limit reached".to_string(), Severity::Quota)]);
        })
        .await;
}

#[tokio::test]
async fn popup_with_nothing_to_show_is_destroyed() {
    LocalSet::new()
        .run_until(async {
            let mut h = Harness::new();
            let popup = word(h.trigger("gato").await);
            let tags = h.started();

            h.emit([
                StreamEvent::error(tags[0], "bad gateway", None),
                StreamEvent::error(tags[1], "bad gateway", None),
            ])
            .await;
            assert_eq!(popup.state(), OverlayState::Destroyed);
            assert!(!h.doc.is_connected(popup.root()));
            assert!(h.orchestrator.overlays().current_popup().is_none());
            assert_eq!(h.toasts.severities(), vec![Severity::Error, Severity::Error]);
        })
        .await;
}

#[tokio::test]
async fn correction_quota_opens_nothing() {
    LocalSet::new()
        .run_until(async {
            let mut h = Harness::new();
            h.corrector.results.borrow_mut().push_back(Err(CorrectionError::Quota {
                message: "daily limit reached".into(),
                code: Some(3001),
            }));

            let outcome = h.trigger("gato").await;
            assert!(matches!(outcome, TriggerOutcome::QuotaExceeded));
            assert!(h.posted().is_empty());
            assert!(h.doc.find_by_class("honyaku-popup").is_empty());
            assert!(h.doc.find_by_class("honyaku-word").is_empty());
            assert_eq!(h.toasts.severities(), vec![Severity::Quota]);
        })
        .await;
}

#[tokio::test]
async fn corrected_word_is_wrapped_and_requested() {
    LocalSet::new()
        .run_until(async {
            let mut h = Harness::new();
            h.corrector.results.borrow_mut().push_back(Ok(" gato ".into()));
            let popup = word(h.trigger("gato").await);

            assert_eq!(h.corrector.calls.borrow().as_slice(), &["gato".to_string()]);
            assert_eq!(h.doc.class_of(popup.anchor()), "honyaku-word");
            assert_eq!(h.doc.text_content(popup.anchor()), "gato");
            assert_eq!(h.doc.text_content(h.paragraph), SENTENCE);

            let prompts: Vec<String> = h
                .posted()
                .into_iter()
                .filter_map(|m| match m {
                    ClientToBackground::StartStream { prompt_payload, .. } => Some(prompt_payload.prompt),
                    _ => None,
                })
                .collect();
            assert_eq!(prompts.len(), 2);
            assert!(prompts.iter().all(|p| p.contains("Word: gato") && p.contains(SENTENCE)));
        })
        .await;
}

#[tokio::test]
async fn failed_correction_falls_back_to_raw_selection() {
    LocalSet::new()
        .run_until(async {
            let mut h = Harness::new();
            h.corrector
                .results
                .borrow_mut()
                .push_back(Err(CorrectionError::Failed("timeout".into())));
            let popup = word(h.trigger("negro").await);
            assert_eq!(h.doc.text_content(popup.anchor()), "negro");
            assert_eq!(h.started().len(), 2);
            assert!(h.toasts.0.borrow().is_empty());
        })
        .await;
}

#[tokio::test]
async fn width_is_refit_in_batches_and_never_moves_the_popup() {
    LocalSet::new()
        .run_until(async {
            let mut h = Harness::new();
            let popup = word(h.trigger("gato").await);
            let t = h.started()[0];
            let root = popup.root();
            let left = h.doc.style(root, "left");
            let top = h.doc.style(root, "top");
            assert_eq!(popup.width(), 160.0);

            let chunk = "x".repeat(50);
            h.emit([StreamEvent::delta(t, chunk.clone()), StreamEvent::delta(t, chunk.clone())]).await;
            // 100 chars would fit 200px, but the batch threshold is not reached yet.
            assert_eq!(popup.width(), 160.0);

            h.emit([StreamEvent::delta(t, chunk.clone())]).await;
            assert_eq!(popup.width(), 300.0);
            assert_eq!(h.doc.style(root, "width").as_deref(), Some("300px"));
            assert_eq!(h.doc.style(root, "left"), left);
            assert_eq!(h.doc.style(root, "top"), top);
            assert_eq!(h.doc.layout_passes(), 1);
        })
        .await;
}

#[tokio::test]
async fn finalized_popup_reopens_without_a_request() {
    LocalSet::new()
        .run_until(async {
            let mut h = Harness::new();
            let popup = word(h.trigger("gato").await);
            let tags = h.started();
            h.emit([StreamEvent::done(tags[0], "the cat"), StreamEvent::error(tags[1], "busy", None)]).await;
            // A `done` without deltas still shows its full text.
            assert_eq!(popup.state(), OverlayState::Finalized);
            assert_eq!(h.text_of(popup.slot(Translation)), "the cat");

            let span = popup.anchor();
            assert!(h.orchestrator.dismiss());
            h.posted();

            let reopened = h.orchestrator.reopen(span).expect("saved popup");
            assert_eq!(reopened.state(), OverlayState::Finalized);
            assert_eq!(h.text_of(reopened.slot(Translation)), "the cat");
            assert_eq!(reopened.status(Explanation), Some(SubStreamStatus::Cleared));
            assert!(h.posted().is_empty());
            assert!(h.orchestrator.reopen(h.paragraph).is_none());
        })
        .await;
}

#[tokio::test]
async fn reopened_popup_shows_saved_text() {
    LocalSet::new()
        .run_until(async {
            let mut h = Harness::new();
            let popup = word(h.trigger("gato").await);
            let tags = h.started();
            h.emit([
                StreamEvent::delta(tags[0], "the cat"),
                StreamEvent::done(tags[0], "the cat"),
                StreamEvent::delta(tags[1], "Noun."),
                StreamEvent::done(tags[1], "Noun."),
            ])
            .await;
            let span = popup.anchor();
            h.orchestrator.dismiss();

            let reopened = h.orchestrator.reopen(span).expect("saved popup");
            assert_eq!(h.text_of(reopened.slot(Translation)), "the cat");
            assert_eq!(h.text_of(reopened.slot(Explanation)), "Noun.");
            assert!(reopened.tags().is_empty());
        })
        .await;
}

#[tokio::test]
async fn speak_reads_rendered_text_only() {
    LocalSet::new()
        .run_until(async {
            let mut h = Harness::new();
            let popup = word(h.trigger("gato").await);
            let tags = h.started();
            h.emit([StreamEvent::delta(tags[0], "the cat")]).await;

            h.orchestrator.speak(&popup, Translation);
            h.orchestrator.speak(&popup, Explanation);
            assert_eq!(h.speaker.0.borrow().as_slice(), &["the cat".to_string()]);
            assert_eq!(popup.status(Translation), Some(SubStreamStatus::Streaming));
            assert!(h.posted().is_empty());
        })
        .await;
}

#[tokio::test]
async fn empty_selection_is_ignored() {
    LocalSet::new()
        .run_until(async {
            let mut h = Harness::new();
            h.doc.clear_selection();
            assert!(matches!(h.orchestrator.trigger().await, TriggerOutcome::Ignored));
            assert!(h.posted().is_empty());
            assert_eq!(h.doc.mutation_count(), 0);
        })
        .await;
}

#[tokio::test]
async fn detached_page_tears_down_its_overlays() {
    LocalSet::new()
        .run_until(async {
            let mut h = Harness::new();
            let popup = word(h.trigger("gato").await);
            let tags = h.started();

            h.channel.detach(h.page);
            common::settle().await;
            assert!(h.agent_task.is_finished());
            assert_eq!(popup.state(), OverlayState::Destroyed);
            assert_eq!(cancelled(&h.posted()).len(), tags.len());
        })
        .await;
}
