//! The closed set of node kinds and their categories

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkflowError};

/// Node category, which decides how the engine schedules a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeCategory {
    /// Seeds the ready queue
    Start,
    /// Takes effect at build time, never scheduled
    Model,
    Message,
    Agent,
    Pipeline,
    Service,
    Tool,
    /// Binary branch with `output_1` (true) and `output_2` (false)
    Conditional,
    Copy,
}

impl NodeCategory {
    /// Prefix used for operator variable names
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Model => "model",
            Self::Message => "message",
            Self::Agent => "agent",
            Self::Pipeline => "pipeline",
            Self::Service => "service",
            Self::Tool => "tool",
            Self::Conditional => "ifelse",
            Self::Copy => "copy",
        }
    }
}

impl fmt::Display for NodeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every node type a configuration may name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Start,
    DashScopeChat,
    OpenAiChat,
    PostApiChat,
    PostApiDallE,
    DashScopeImageSynthesis,
    Message,
    DialogAgent,
    UserAgent,
    TextToImageAgent,
    DictDialogAgent,
    ReActAgent,
    BroadcastAgent,
    Placeholder,
    MsgHub,
    SequentialPipeline,
    ForLoopPipeline,
    WhileLoopPipeline,
    IfElsePipeline,
    SwitchPipeline,
    Copy,
    BingSearchService,
    GoogleSearchService,
    PythonService,
    ReadTextService,
    WriteTextService,
    TextToAudioService,
    TextToImageService,
    Post,
    ImageComposition,
    ImageMotion,
    VideoComposition,
    Code,
    IfElse,
}

/// Type names as they appear in configuration documents
const NAMES: [(NodeKind, &str); 34] = [
    (NodeKind::Start, "start"),
    (NodeKind::DashScopeChat, "dashscope_chat"),
    (NodeKind::OpenAiChat, "openai_chat"),
    (NodeKind::PostApiChat, "post_api_chat"),
    (NodeKind::PostApiDallE, "post_api_dall_e"),
    (NodeKind::DashScopeImageSynthesis, "dashscope_image_synthesis"),
    (NodeKind::Message, "Message"),
    (NodeKind::DialogAgent, "DialogAgent"),
    (NodeKind::UserAgent, "UserAgent"),
    (NodeKind::TextToImageAgent, "TextToImageAgent"),
    (NodeKind::DictDialogAgent, "DictDialogAgent"),
    (NodeKind::ReActAgent, "ReActAgent"),
    (NodeKind::BroadcastAgent, "BroadcastAgent"),
    (NodeKind::Placeholder, "Placeholder"),
    (NodeKind::MsgHub, "MsgHub"),
    (NodeKind::SequentialPipeline, "SequentialPipeline"),
    (NodeKind::ForLoopPipeline, "ForLoopPipeline"),
    (NodeKind::WhileLoopPipeline, "WhileLoopPipeline"),
    (NodeKind::IfElsePipeline, "IfElsePipeline"),
    (NodeKind::SwitchPipeline, "SwitchPipeline"),
    (NodeKind::Copy, "CopyNode"),
    (NodeKind::BingSearchService, "BingSearchService"),
    (NodeKind::GoogleSearchService, "GoogleSearchService"),
    (NodeKind::PythonService, "PythonService"),
    (NodeKind::ReadTextService, "ReadTextService"),
    (NodeKind::WriteTextService, "WriteTextService"),
    (NodeKind::TextToAudioService, "TextToAudioService"),
    (NodeKind::TextToImageService, "TextToImageService"),
    (NodeKind::Post, "Post"),
    (NodeKind::ImageComposition, "ImageComposition"),
    (NodeKind::ImageMotion, "ImageMotion"),
    (NodeKind::VideoComposition, "VideoComposition"),
    (NodeKind::Code, "Code"),
    (NodeKind::IfElse, "IF/ELSE"),
];

impl NodeKind {
    pub fn from_name(name: &str) -> Option<Self> {
        NAMES.iter().find(|(_, n)| *n == name).map(|(k, _)| *k)
    }

    /// Like [`NodeKind::from_name`], rejecting unknown names
    pub fn parse(name: &str) -> Result<Self> {
        Self::from_name(name).ok_or_else(|| WorkflowError::UnknownNodeType(name.to_string()))
    }

    pub fn name(&self) -> &'static str {
        NAMES
            .iter()
            .find(|(k, _)| k == self)
            .map(|(_, n)| *n)
            .unwrap_or("unknown")
    }

    pub fn all() -> impl Iterator<Item = NodeKind> {
        NAMES.iter().map(|(k, _)| *k)
    }

    pub fn category(&self) -> NodeCategory {
        match self {
            Self::Start => NodeCategory::Start,
            Self::DashScopeChat
            | Self::OpenAiChat
            | Self::PostApiChat
            | Self::PostApiDallE
            | Self::DashScopeImageSynthesis => NodeCategory::Model,
            Self::Message => NodeCategory::Message,
            Self::DialogAgent
            | Self::UserAgent
            | Self::TextToImageAgent
            | Self::DictDialogAgent
            | Self::ReActAgent
            | Self::BroadcastAgent => NodeCategory::Agent,
            Self::Placeholder
            | Self::MsgHub
            | Self::SequentialPipeline
            | Self::ForLoopPipeline
            | Self::WhileLoopPipeline
            | Self::IfElsePipeline
            | Self::SwitchPipeline => NodeCategory::Pipeline,
            Self::Copy => NodeCategory::Copy,
            Self::BingSearchService
            | Self::GoogleSearchService
            | Self::PythonService
            | Self::ReadTextService
            | Self::WriteTextService
            | Self::TextToAudioService
            | Self::TextToImageService => NodeCategory::Service,
            Self::Post
            | Self::ImageComposition
            | Self::ImageMotion
            | Self::VideoComposition
            | Self::Code => NodeCategory::Tool,
            Self::IfElse => NodeCategory::Conditional,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_are_unique_and_resolvable() {
        let mut seen = HashSet::new();
        for kind in NodeKind::all() {
            assert!(seen.insert(kind.name()), "duplicate name {}", kind.name());
            assert_eq!(NodeKind::from_name(kind.name()), Some(kind));
        }
    }

    #[test]
    fn test_unknown_name_rejected() {
        assert!(NodeKind::from_name("dialogagent").is_none());
        let err = NodeKind::parse("WeatherService").unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownNodeType(name) if name == "WeatherService"));
    }

    #[test]
    fn test_categories() {
        assert_eq!(NodeKind::OpenAiChat.category(), NodeCategory::Model);
        assert_eq!(NodeKind::IfElse.category(), NodeCategory::Conditional);
        assert_eq!(NodeKind::Copy.category(), NodeCategory::Copy);
        assert_eq!(NodeKind::MsgHub.category(), NodeCategory::Pipeline);
        assert_eq!(NodeKind::Post.category(), NodeCategory::Tool);
        assert_eq!(NodeKind::TextToImageAgent.category(), NodeCategory::Agent);
        assert_eq!(NodeKind::GoogleSearchService.category(), NodeCategory::Service);
        assert_eq!(NodeKind::VideoComposition.category(), NodeCategory::Tool);
    }

    #[test]
    fn test_editor_media_types_are_known() {
        for name in [
            "TextToImageAgent",
            "BingSearchService",
            "GoogleSearchService",
            "TextToAudioService",
            "TextToImageService",
            "ImageComposition",
            "ImageMotion",
            "VideoComposition",
        ] {
            assert_eq!(NodeKind::parse(name).unwrap().name(), name);
        }
    }
}
