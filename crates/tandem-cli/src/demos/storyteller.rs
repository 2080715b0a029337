// Storyteller
//
// plot -> characters -> scene. Every stage feeds the next one's dependency
// bundle; the scene agent builds its prompt from three generators and returns
// plain text.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tandem_core::{
    Agent, AgentStage, ModelHandle, Pipeline, Result, ResultSchema, RunContext, StageInput,
};

const PLOT_PROMPT: &str = "You are the plot generator of a story based on a given theme. Your \
job is to generate a high-level plot of the story. Output the characters of the story; there \
should be between 3 and 7 of them. Do not use generic names for the characters and bring in \
diversity in the type of characters. Output the general setting where the story takes place, an \
inciting incident, an action to the incident, a climax and a resolution. Make the setting \
elaborate and not generic. The action and the climax could use twists to make the plot more \
entertaining, and the resolution should be complex, not one-dimensional. Only generate a \
high-level plot, and ensure every character has a role in the story.";

const CHARACTER_PROMPT: &str = "You are a character development agent responsible for adding \
depth and richness to the characters in a story. You will receive the list of characters and \
the overall plot of the story. For each character generate:
1. **Name**: The name of the character.
2. **Background**: A brief history of the character, including their upbringing, family, \
education and significant events that shaped them.
3. **Personality**: The character's core personality traits.
4. **Motivations**: What the character wants most in the story, and their fears or desires.
5. **Internal Conflict**: Inner struggles or dilemmas that might influence their actions.
6. **External Conflict**: How other characters, the environment or situations challenge them.
7. **Relationships**: The character's relationship with the other characters in the story.
Tailor the characters to the genre and tone of the plot you receive as context.";

const SCENE_PROMPT: &str = "Your job is to write ONE scene for the short story that we are \
collaboratively creating. A scene is a self-contained narrative segment that unfolds in a \
specific location, involves one or more characters, and moves the story forward by revealing key \
events, interactions or conflicts. Set the scene with sensory detail, let the characters' \
personalities and conflicts show through their actions and dialogue, progress the narrative \
instead of summarizing it, and use tension and subtext. Write as if this is a final draft of a \
published work.";

pub const MIN_CHARACTERS: usize = 3;
pub const MAX_CHARACTERS: usize = 7;

pub struct PlotDeps {
    pub theme: String,
}

/// High-level plot of the story
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlotResult {
    /// The characters of the story
    pub characters: Vec<String>,
    /// The story's general setting
    pub setting: String,
    /// The inciting incident in the plot
    pub inciting_incident: String,
    /// The action to the incident
    pub action: String,
    /// The climax of the plot
    pub climax: String,
    /// The resolution of the plot of the story
    pub resolution: String,
}

impl ResultSchema for PlotResult {
    fn validate(&self) -> std::result::Result<(), String> {
        let count = self.characters.len();
        if !(MIN_CHARACTERS..=MAX_CHARACTERS).contains(&count) {
            return Err(format!(
                "the story needs between {} and {} characters, got {}",
                MIN_CHARACTERS, MAX_CHARACTERS, count
            ));
        }
        Ok(())
    }
}

impl PlotResult {
    fn describe(&self) -> String {
        format!(
            "1. **Characters**: {}\n2. **Setting of the story**: {}\n3. **Inciting incident**: {}\n\
             4. **Action to the incident**: {}\n5. **Climax of the story**: {}\n\
             6. **Resolution of the climax**: {}",
            self.characters.join(", "),
            self.setting,
            self.inciting_incident,
            self.action,
            self.climax,
            self.resolution
        )
    }
}

pub struct CharacterDeps {
    pub theme: String,
    pub plot: PlotResult,
}

/// Traits of one character
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CharacterTraits {
    pub name: String,
    pub background: String,
    pub personality: String,
    pub motivations: String,
    pub internal_conflicts: String,
    pub external_conflicts: String,
    pub relationships: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CharacterRichnessResult {
    /// A list of traits of each character in the story
    pub character_traits: Vec<CharacterTraits>,
}

impl ResultSchema for CharacterRichnessResult {}

impl CharacterRichnessResult {
    fn describe(&self) -> String {
        self.character_traits
            .iter()
            .map(|c| {
                format!(
                    "- {}: {} Personality: {} Motivations: {} Internal conflicts: {} \
                     External conflicts: {} Relationships: {}",
                    c.name,
                    c.background,
                    c.personality,
                    c.motivations,
                    c.internal_conflicts,
                    c.external_conflicts,
                    c.relationships
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct SceneDeps {
    pub plot: PlotResult,
    pub characters: CharacterRichnessResult,
    pub scene_num: u32,
}

/// Everything the storyteller produced
#[derive(Debug, Clone, Serialize)]
pub struct Story {
    pub theme: String,
    pub plot: PlotResult,
    pub characters: CharacterRichnessResult,
    pub scene: String,
}

pub fn plot_agent(model: ModelHandle) -> Result<Agent<PlotDeps, PlotResult>> {
    Agent::builder("plot_generator", model)
        .system_prompt(PLOT_PROMPT)
        .dynamic_prompt_fn(|ctx: &RunContext<PlotDeps>| {
            format!("The theme of the story is {}", ctx.deps.theme)
        })
        .retries(2)
        .build()
}

pub fn character_agent(model: ModelHandle) -> Result<Agent<CharacterDeps, CharacterRichnessResult>> {
    Agent::builder("character_richness", model)
        .system_prompt(CHARACTER_PROMPT)
        .dynamic_prompt_fn(|ctx: &RunContext<CharacterDeps>| {
            format!(
                "Here is some more context about the plot. The theme of the story is {}.\n\n{}\n\n\
                 Keep the plot in mind when generating character traits.",
                ctx.deps.theme,
                ctx.deps.plot.describe()
            )
        })
        .build()
}

pub fn scene_agent(model: ModelHandle) -> Result<Agent<SceneDeps, String>> {
    Agent::builder("scene_generator", model)
        .system_prompt(SCENE_PROMPT)
        .dynamic_prompt_fn(|ctx: &RunContext<SceneDeps>| {
            format!(
                "Below is the high-level plot of the story:\n{}",
                ctx.deps.plot.describe()
            )
        })
        .dynamic_prompt_fn(|ctx: &RunContext<SceneDeps>| {
            format!(
                "Below are the characters of the story and their details:\n{}",
                ctx.deps.characters.describe()
            )
        })
        .dynamic_prompt_fn(|ctx: &RunContext<SceneDeps>| {
            format!(
                "This is the scene number {} of the overall story. The story is British, so \
                 write it in a British contemporary style, in about 250 words.",
                ctx.deps.scene_num
            )
        })
        .build()
}

/// Theme in, story out
pub fn story_pipeline(model: ModelHandle, scene_num: u32) -> Result<Pipeline<String, Story>> {
    let plot = plot_agent(model.clone())?;
    let characters = character_agent(model.clone())?;
    let scene = scene_agent(model)?;

    Ok(Pipeline::new("storyteller")
        .then(
            AgentStage::new("plot", plot, |theme: &String| {
                StageInput::new("Let's start!", PlotDeps {
                    theme: theme.clone(),
                })
            })
            .merge(|theme: String, plot: PlotResult| (theme, plot)),
        )
        .then(
            AgentStage::new("characters", characters, |(theme, plot): &(String, PlotResult)| {
                StageInput::new(
                    "Generate character richness for the story.",
                    CharacterDeps {
                        theme: theme.clone(),
                        plot: plot.clone(),
                    },
                )
            })
            .merge(
                |(theme, plot): (String, PlotResult), characters: CharacterRichnessResult| {
                    (theme, plot, characters)
                },
            ),
        )
        .then(
            AgentStage::new(
                "scene",
                scene,
                move |(_, plot, characters): &(String, PlotResult, CharacterRichnessResult)| {
                    StageInput::new(
                        "Generate the next scene of the story.",
                        SceneDeps {
                            plot: plot.clone(),
                            characters: characters.clone(),
                            scene_num,
                        },
                    )
                },
            )
            .merge(
                |(theme, plot, characters): (String, PlotResult, CharacterRichnessResult),
                 scene: String| Story {
                    theme,
                    plot,
                    characters,
                    scene,
                },
            ),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tandem_core::memory::{MockLlmDriver, MockLlmResponse};

    fn plot_json(characters: &[&str]) -> serde_json::Value {
        json!({
            "characters": characters,
            "setting": "A fog-bound Cornish fishing village",
            "inciting_incident": "The harbourmaster is found dead",
            "action": "The vicar starts asking questions",
            "climax": "A storm traps everyone in the lighthouse",
            "resolution": "The truth splits the village in two"
        })
    }

    fn characters_json() -> serde_json::Value {
        json!({"character_traits": [{
            "name": "Morwenna Trevithick",
            "background": "Raised above the harbour.",
            "personality": "Guarded",
            "motivations": "Protect her brother",
            "internal_conflicts": "Loyalty against truth",
            "external_conflicts": "The village's suspicion",
            "relationships": "Sister of the suspect"
        }]})
    }

    #[tokio::test]
    async fn test_story_pipeline() {
        let driver = MockLlmDriver::with_responses(vec![
            MockLlmResponse::final_result(plot_json(&["Morwenna", "Father Ellis", "Kit"])),
            MockLlmResponse::final_result(characters_json()),
            MockLlmResponse::text("The fog rolled in off the water..."),
        ]);

        let story = story_pipeline(driver.handle(), 1)
            .unwrap()
            .run("a murder mystery".to_string())
            .await
            .unwrap();

        assert_eq!(story.output.scene, "The fog rolled in off the water...");
        assert_eq!(story.stages.len(), 3);

        let calls = driver.calls().await;
        assert_eq!(
            calls[0].system_prompts()[1],
            "The theme of the story is a murder mystery"
        );
        assert!(calls[1].system_prompts()[1].contains("Morwenna, Father Ellis, Kit"));

        // Scene agent: static prompt plus three generators, and no result tool
        let scene_prompts = calls[2].system_prompts();
        assert_eq!(scene_prompts.len(), 4);
        assert!(scene_prompts[1].contains("Cornish fishing village"));
        assert!(scene_prompts[2].contains("Morwenna Trevithick"));
        assert!(scene_prompts[3].starts_with("This is the scene number 1"));
        assert!(calls[2].tool_names().is_empty());
    }

    #[tokio::test]
    async fn test_plot_with_too_few_characters_is_retried() {
        let driver = MockLlmDriver::with_responses(vec![
            MockLlmResponse::final_result(plot_json(&["Morwenna"])),
            MockLlmResponse::final_result(plot_json(&["Morwenna", "Father Ellis", "Kit"])),
        ]);

        let result = plot_agent(driver.handle())
            .unwrap()
            .run(
                "Let's start!",
                PlotDeps {
                    theme: "a murder mystery".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(result.output.characters.len(), 3);
        assert_eq!(result.retries(), 1);
        let calls = driver.calls().await;
        assert!(calls[1]
            .messages
            .last()
            .unwrap()
            .content
            .contains("between 3 and 7 characters"));
    }
}
