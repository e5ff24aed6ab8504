//! Built-in outline templates.

use crate::types::OutlineSection;

/// A named outline structure the draft outline starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    sections: &'static [(&'static str, &'static str, &'static str)],
}

impl OutlineTemplate {
    /// Placeholder sections, ready to be filled by outline generation.
    pub fn sections(&self) -> Vec<OutlineSection> {
        self.sections
            .iter()
            .map(|(id, title, content)| OutlineSection::new(*id, *title, *content))
            .collect()
    }
}

pub const TEMPLATES: &[OutlineTemplate] = &[
    OutlineTemplate {
        id: "classic-5-step",
        name: "Classic five steps",
        description: "The standard structure for most articles, leading readers from awareness to action.",
        sections: &[
            ("sec-1", "[Hook]", "Raise the problem or scene that pulls the reader in..."),
            ("sec-2", "[Core insight]", "Dig into the problem, offer a distinct view, build resonance..."),
            ("sec-3", "[Solution / value]", "Lay out the solution or the core value proposition..."),
            ("sec-4", "[Call to action]", "Point the reader clearly at the next step..."),
            ("sec-5", "[Notes / outlook]", "Wrap up or look ahead..."),
        ],
    },
    OutlineTemplate {
        id: "pas-framework",
        name: "PAS framework",
        description: "Problem, agitate, solve: sharpens persuasion, suited to marketing copy.",
        sections: &[
            ("pas-1", "[P - Problem]", "Describe the reader's core pain point clearly."),
            ("pas-2", "[A - Agitate]", "Dig into the consequences and feelings the pain brings."),
            ("pas-3", "[S - Solution]", "Introduce the solution and show how it resolves the problem."),
        ],
    },
    OutlineTemplate {
        id: "story-arc",
        name: "Hero's journey",
        description: "A narrative arc for brand stories and personal growth pieces.",
        sections: &[
            ("story-1", "[Ordinary world]", "Introduce the protagonist's starting state and background."),
            ("story-2", "[Call to adventure]", "A problem breaks the calm and forces a change."),
            ("story-3", "[Trials]", "The obstacles and turning points along the way."),
            ("story-4", "[The treasure]", "The insight, ability or solution the protagonist earns."),
            ("story-5", "[Return]", "Coming home with the prize and sharing it (call to action)."),
        ],
    },
];

/// Render an outline as Markdown: one `## title` block per section, brackets
/// dropped from the title, sections separated by `---`.
pub fn outline_markdown(sections: &[OutlineSection]) -> String {
    sections
        .iter()
        .map(|s| {
            let title = s.title.replace(['[', ']', '【', '】'], "");
            format!("## {title}\n\n{}", s.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// Look up a built-in template by id.
pub fn find_template(id: &str) -> Option<&'static OutlineTemplate> {
    TEMPLATES.iter().find(|t| t.id == id)
}
