use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use pagemark_core::{Command, PageId, Point, Session};
use serde::Deserialize;
use tracing::debug;

/// One step of a batch annotation script.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScriptAction {
    Pen,
    Check,
    Text { text: String },
    QuickStamp { index: usize },
    Stroke { page: usize, points: Vec<Point> },
    Click { page: usize, at: Point },
    Undo,
    UndoPage { page: usize },
}

pub fn load_script(path: &Path) -> Result<Vec<ScriptAction>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read script {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to decode script {:?}", path))
}

pub fn run_script(session: &mut Session, actions: &[ScriptAction]) -> Result<()> {
    for (step, action) in actions.iter().enumerate() {
        debug!(step, ?action, "script step");
        apply_action(session, action).with_context(|| format!("script step {}", step + 1))?;
    }
    Ok(())
}

fn apply_action(session: &mut Session, action: &ScriptAction) -> Result<()> {
    match action {
        ScriptAction::Pen => session.apply(Command::SelectPen)?,
        ScriptAction::Check => session.apply(Command::SelectCheckMark)?,
        ScriptAction::Text { text } => session.apply(Command::SubmitCustomText {
            text: text.clone(),
        })?,
        ScriptAction::QuickStamp { index } => {
            if *index >= session.quick_stamps().len() {
                bail!("no quick stamp #{}", index + 1);
            }
            session.apply(Command::SelectQuickStamp { index: *index })?;
        }
        ScriptAction::Stroke { page, points } => {
            let id = page_id(session, *page)?;
            let Some((first, rest)) = points.split_first() else {
                bail!("stroke on page {} has no points", page + 1);
            };
            session.pointer_down(id, *first);
            for point in rest {
                session.pointer_move(id, *point);
            }
            session.pointer_up(id)?;
        }
        ScriptAction::Click { page, at } => {
            let id = page_id(session, *page)?;
            session.pointer_click(id, *at)?;
        }
        ScriptAction::Undo => session.apply(Command::Undo)?,
        ScriptAction::UndoPage { page } => {
            let id = page_id(session, *page)?;
            session.undo_page(id);
        }
    }
    Ok(())
}

fn page_id(session: &Session, page: usize) -> Result<PageId> {
    session
        .document()
        .page_at(page)
        .map(|page| page.id)
        .ok_or_else(|| anyhow!("page {} does not exist", page + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_every_action_kind() {
        let actions: Vec<ScriptAction> = serde_json::from_str(
            r#"[
                {"action": "pen"},
                {"action": "stroke", "page": 0, "points": [{"x": 1, "y": 2}, {"x": 3.5, "y": 4}]},
                {"action": "check"},
                {"action": "click", "page": 1, "at": {"x": 50, "y": 50}},
                {"action": "text", "text": "Kim"},
                {"action": "quick_stamp", "index": 0},
                {"action": "undo"},
                {"action": "undo_page", "page": 1}
            ]"#,
        )
        .unwrap();

        assert_eq!(actions.len(), 8);
        assert_eq!(
            actions[1],
            ScriptAction::Stroke {
                page: 0,
                points: vec![Point::new(1.0, 2.0), Point::new(3.5, 4.0)],
            }
        );
        assert_eq!(actions[7], ScriptAction::UndoPage { page: 1 });
    }

    #[test]
    fn rejects_unknown_actions() {
        let result: serde_json::Result<Vec<ScriptAction>> =
            serde_json::from_str(r#"[{"action": "erase"}]"#);
        assert!(result.is_err());
    }

    #[test]
    fn actions_against_missing_pages_fail() {
        let mut session = Session::new(&pagemark_core::Config::default());
        let err = run_script(
            &mut session,
            &[ScriptAction::Click {
                page: 0,
                at: Point::new(1.0, 1.0),
            }],
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("page 1 does not exist"));
    }
}
