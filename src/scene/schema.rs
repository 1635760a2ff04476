use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{PipelineError, Result};

/// Which script shape the generator should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetModel {
    /// Scene-by-scene script for segmented video generation
    Structured,
    /// Single structured prompt (persona, task, context...)
    Freeform,
}

impl FromStr for TargetModel {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "structured" | "veo" => Ok(Self::Structured),
            "freeform" | "geral" | "general" => Ok(Self::Freeform),
            other => Err(PipelineError::invalid_argument(format!(
                "unknown target model: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for TargetModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetModel::Structured => write!(f, "structured"),
            TargetModel::Freeform => write!(f, "freeform"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputModality {
    Video,
    Image,
    Url,
    Text,
}

impl FromStr for InputModality {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "video" => Ok(Self::Video),
            "image" => Ok(Self::Image),
            "url" => Ok(Self::Url),
            "text" => Ok(Self::Text),
            other => Err(PipelineError::invalid_argument(format!(
                "unknown input modality: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for InputModality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InputModality::Video => "video",
            InputModality::Image => "image",
            InputModality::Url => "url",
            InputModality::Text => "text",
        };
        f.write_str(name)
    }
}

/// System instruction plus the response schema handed to structured generation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptRequest {
    pub instruction: String,
    pub schema: Value,
}

const SCENE_OPTIMIZATION_RULE: &str = "A critical requirement is to divide the script into scenes with a maximum duration of 8 seconds each, as this is the limit for the video generation model. Your main goal is to optimize the script by creating as many 8-second scenes as possible to minimize the total number of scenes. For example, a 30-second concept should be divided into three 8-second scenes and one 6-second scene, not five 6-second scenes.";

const SCENE_LANGUAGE_RULE: &str = "The script's primary language for visual prompts, narration, and subtitles must be English. Crucially, you must also provide a Brazilian Portuguese translation for the narration of each scene in a separate JSON field. Finally, include a specific instruction for the video generation model to produce the final audio and subtitles in Brazilian Portuguese.";

const TRANSFORM_INSTRUCTION: &str = "You are an expert script editor. Your task is to modify the provided JSON script based on the user's instructions. You MUST maintain the original JSON structure and all its fields. Only change the content of the fields as requested by the user. The entire script must remain in English.";

const CONCEPT_ART_INSTRUCTION: &str = "You are a visual artist expert. Based on the provided input (video, image, URL, or text), create a single, highly detailed and cinematic prompt for an image generation AI. Describe the style, mood, color palette, key subjects, and environment to capture the essence of the input in one compelling image.";

pub struct ScriptSchema;

impl ScriptSchema {
    pub fn build_request(model: TargetModel, modality: InputModality) -> ScriptRequest {
        match model {
            TargetModel::Structured => ScriptRequest {
                instruction: Self::structured_instruction(modality),
                schema: Self::structured_schema(),
            },
            TargetModel::Freeform => ScriptRequest {
                instruction: Self::freeform_instruction(modality).to_string(),
                schema: Self::freeform_schema(),
            },
        }
    }

    /// Same as [`build_request`](Self::build_request) but from user-supplied names.
    pub fn build_request_from_names(model: &str, modality: &str) -> Result<ScriptRequest> {
        Ok(Self::build_request(model.parse()?, modality.parse()?))
    }

    fn structured_instruction(modality: InputModality) -> String {
        let (task, basis) = match modality {
            InputModality::Video => (
                "Your task is to analyze the provided video and create a detailed, scene-by-scene script in JSON format based on its content.",
                "Base the script on the user's video and any additional instructions they provide.",
            ),
            InputModality::Image => (
                "Your task is to analyze the provided static image and create a detailed, scene-by-scene script in JSON format based on its content. Imagine the image is a single frame from a larger story. Create a narrative around it.",
                "Base the script on the user's image and any additional instructions they provide.",
            ),
            InputModality::Url => (
                "Your task is to create a detailed, scene-by-scene script in JSON format based on the content of the provided URL and the user's instructions.",
                "Base the script on the user's instructions and the URL content.",
            ),
            InputModality::Text => (
                "Your task is to create a detailed, scene-by-scene script in JSON format based on the user's instructions.",
                "Base the script on the user's instructions.",
            ),
        };

        format!(
            "You are an expert scriptwriter for AI video generation models. {} {} {} {}",
            task, SCENE_OPTIMIZATION_RULE, SCENE_LANGUAGE_RULE, basis
        )
    }

    fn freeform_instruction(modality: InputModality) -> &'static str {
        match modality {
            InputModality::Video => "Sua tarefa é analisar o vídeo fornecido e transformá-lo em um prompt detalhado para um modelo de IA generativa de vídeo, estruturado como um objeto JSON. O JSON deve incluir uma persona, a tarefa, contexto, requisitos, formato de saída, restrições e legendas em português para o vídeo a ser gerado, tudo baseado no conteúdo do vídeo e nas instruções do usuário.",
            InputModality::Image => "Sua tarefa é analisar a imagem fornecida e transformá-la em um prompt detalhado para um modelo de IA generativa de vídeo, estruturado como um objeto JSON. O JSON deve incluir uma persona, a tarefa, contexto, requisitos, formato de saída, restrições e legendas em português para o vídeo a ser gerado, tudo baseado no conteúdo da imagem e nas instruções do usuário.",
            InputModality::Url => "Sua tarefa é analisar o conteúdo da URL fornecida e transformá-lo em um prompt detalhado para um modelo de IA generativa de vídeo, estruturado como um objeto JSON. O JSON deve incluir uma persona, a tarefa, contexto, requisitos, formato de saída, restrições e legendas em português para o vídeo a ser gerado, tudo baseado no conteúdo da URL e nas instruções do usuário.",
            InputModality::Text => "Sua tarefa é criar um prompt detalhado para um modelo de IA generativa de vídeo, estruturado como um objeto JSON, baseado nas instruções do usuário. O JSON deve incluir uma persona, a tarefa, contexto, requisitos, formato de saída, restrições e legendas em português para o vídeo a ser gerado.",
        }
    }

    fn structured_schema() -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "scenes": {
                    "type": "ARRAY",
                    "description": "An array of scenes for the video.",
                    "items": {
                        "type": "OBJECT",
                        "properties": {
                            "scene_number": {
                                "type": "INTEGER",
                                "description": "The sequential number of the scene."
                            },
                            "visual_prompt_english": {
                                "type": "STRING",
                                "description": "A detailed visual description of the scene in English for the video generation model."
                            },
                            "duration_seconds": {
                                "type": "INTEGER",
                                "description": "Duration of the scene in seconds. It must be at most 8 seconds. Prioritize making scenes exactly 8 seconds long to optimize the total number of scenes.",
                                "maximum": 8
                            },
                            "narration_english": {
                                "type": "STRING",
                                "description": "The narration script for this scene in English."
                            },
                            "narration_portuguese": {
                                "type": "STRING",
                                "description": "The narration script for this scene in Brazilian Portuguese."
                            },
                            "subtitles_english": {
                                "type": "STRING",
                                "description": "The subtitles for this scene in English, matching the narration."
                            }
                        },
                        "required": [
                            "scene_number",
                            "visual_prompt_english",
                            "duration_seconds",
                            "narration_english",
                            "narration_portuguese",
                            "subtitles_english"
                        ]
                    }
                },
                "final_instructions": {
                    "type": "STRING",
                    "description": "Final instructions for the video model. Must be in English. It must require the final video's audio track and subtitles to be generated in Brazilian Portuguese.",
                    "example": "The final video's audio track and subtitles must be generated in Brazilian Portuguese."
                }
            },
            "required": ["scenes", "final_instructions"]
        })
    }

    fn freeform_schema() -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "persona": {
                    "type": "STRING",
                    "description": "A persona que a IA deve assumir."
                },
                "tarefa": {
                    "type": "STRING",
                    "description": "A tarefa principal a ser executada."
                },
                "contexto": {
                    "type": "STRING",
                    "description": "Informações de fundo relevantes."
                },
                "passos_requisitos": {
                    "type": "ARRAY",
                    "items": { "type": "STRING" },
                    "description": "Passos ou requisitos para a tarefa."
                },
                "formato_saida": {
                    "type": "STRING",
                    "description": "O formato esperado da saída."
                },
                "restricoes": {
                    "type": "ARRAY",
                    "items": { "type": "STRING" },
                    "description": "Restrições ou limitações a serem consideradas."
                },
                "legendas_sugestao": {
                    "type": "STRING",
                    "description": "Sugestão de legendas em português para o vídeo."
                }
            },
            "required": [
                "persona",
                "tarefa",
                "contexto",
                "passos_requisitos",
                "formato_saida",
                "restricoes",
                "legendas_sugestao"
            ]
        })
    }

    /// Request for the bilingual technical summary of a finished script.
    pub fn summary_request(total_duration_seconds: u64) -> ScriptRequest {
        let instruction = format!(
            "You are an expert in creating directive video generation prompts. Based on the provided JSON script, your task is to create a new command prompt that acts as a technical summary.

The Brazilian Portuguese prompt MUST begin with 'Crie um vídeo de {total} segundos, com áudio em português do Brasil.'.
The English prompt MUST begin with 'Create a {total}-second video, with audio in Brazilian Portuguese.'.

Following that, for both languages, concisely add technical details extracted from the script, such as:
- The visual style (e.g., '3D animation', 'live-action cinematic shot').
- A brief description of the required narration or speech.
- Mention key elements like 3D details or special effects.

The goal is to create a very brief, technical, and directive summary for recreating the video. Your output must be a JSON object.",
            total = total_duration_seconds
        );

        ScriptRequest {
            instruction,
            schema: json!({
                "type": "OBJECT",
                "properties": {
                    "summary_english": {
                        "type": "STRING",
                        "description": "A directive and technical summary in English."
                    },
                    "summary_portuguese": {
                        "type": "STRING",
                        "description": "Um resumo diretivo e técnico em Português do Brasil."
                    }
                },
                "required": ["summary_english", "summary_portuguese"]
            }),
        }
    }

    pub fn transform_instruction() -> &'static str {
        TRANSFORM_INSTRUCTION
    }

    pub fn concept_art_instruction() -> &'static str {
        CONCEPT_ART_INSTRUCTION
    }
}
