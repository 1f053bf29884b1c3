//! Context text handed to agents, rendered from templates.

use anyhow::Result;
use minijinja::{Environment, context};

use crate::core::dialog::Dialog;
use crate::core::task::Task;

const NEW_TASK_TEMPLATE: &str = include_str!("prompts/new_task.txt");
const DIALOG_REPLY_TEMPLATE: &str = include_str!("prompts/dialog_reply.txt");

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("new_task", NEW_TASK_TEMPLATE)?;
        env.add_template("dialog_reply", DIALOG_REPLY_TEMPLATE)?;
        Ok(Self { env })
    }

    /// Context for a task picked up for the first time: title plus note.
    pub fn render_new_task(&self, task: &Task) -> Result<String> {
        let template = self.env.get_template("new_task")?;
        let rendered = template.render(context! {
            title => task.name(),
            note => task.note().map(str::trim).filter(|s| !s.is_empty()),
        })?;
        Ok(rendered)
    }

    /// Context for answering a dialog: title, indented transcript, and the
    /// latest message the agent is expected to answer.
    pub fn render_dialog_reply(&self, dialog: &Dialog) -> Result<String> {
        let template = self.env.get_template("dialog_reply")?;
        let latest = dialog.last_message().map(|msg| msg.text.as_str());
        let rendered = template.render(context! {
            title => dialog.task_name.as_str(),
            transcript => dialog.context_for_agent(),
            latest => latest,
        })?;
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classifier::AutonomyRules;
    use crate::test_support::{message_node, node_named};

    #[test]
    fn new_task_context_includes_note_when_present() {
        let engine = PromptEngine::new().expect("engine");
        let mut node = node_named("t", 0, "написать тесты #agent");
        let task = Task::from_node(node.clone(), &AutonomyRules::default());
        assert_eq!(
            engine.render_new_task(&task).expect("render"),
            "Task: написать тесты #agent"
        );

        node.note = Some("cover the parser".to_string());
        let task = Task::from_node(node, &AutonomyRules::default());
        assert_eq!(
            engine.render_new_task(&task).expect("render"),
            "Task: написать тесты #agent\nNote: cover the parser"
        );
    }

    #[test]
    fn dialog_context_has_transcript_and_instruction() {
        let engine = PromptEngine::new().expect("engine");
        let dialog = Dialog::from_subtree(
            "t",
            "Onboarding <flow>",
            &[message_node(
                "m1",
                0,
                "🤖 three variants",
                vec![message_node("m2", 0, "👤 B, max 3 questions", vec![])],
            )],
        );

        let rendered = engine.render_dialog_reply(&dialog).expect("render");
        assert_eq!(
            rendered,
            "Task: Onboarding <flow>\n\
             \n\
             Dialog history:\n\
             🤖 three variants\n  👤 B, max 3 questions\n\
             \n\
             Latest human message: B, max 3 questions\n\
             \n\
             Respond to the human's latest message."
        );
    }

    #[test]
    fn empty_dialog_has_no_latest_message() {
        let engine = PromptEngine::new().expect("engine");
        let dialog = Dialog::from_subtree("t", "Task", &[]);
        assert_eq!(
            engine.render_dialog_reply(&dialog).expect("render"),
            "Task: Task\n\nDialog history:"
        );
    }
}
