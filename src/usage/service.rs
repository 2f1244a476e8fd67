use serde::{Deserialize, Serialize};

/// Billable AI sub-services that report credit usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    CortexAnalyst,
    CortexSearch,
    CortexFunctions,
    DocumentAi,
    FineTuning,
}

impl ServiceType {
    pub const ALL: [ServiceType; 5] = [
        ServiceType::CortexAnalyst,
        ServiceType::CortexSearch,
        ServiceType::CortexFunctions,
        ServiceType::DocumentAi,
        ServiceType::FineTuning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::CortexAnalyst => "cortex_analyst",
            ServiceType::CortexSearch => "cortex_search",
            ServiceType::CortexFunctions => "cortex_functions",
            ServiceType::DocumentAi => "document_ai",
            ServiceType::FineTuning => "fine_tuning",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ServiceType::CortexAnalyst => "Cortex Analyst",
            ServiceType::CortexSearch => "Cortex Search",
            ServiceType::CortexFunctions => "Cortex Functions",
            ServiceType::DocumentAi => "Document AI",
            ServiceType::FineTuning => "Fine-tuning",
        }
    }

    /// Parse a service tag as it appears in billing exports.
    ///
    /// Matching ignores case and treats spaces and hyphens as underscores, so
    /// `"Cortex Analyst"`, `"cortex-analyst"` and `"CORTEX_ANALYST"` are equal.
    pub fn parse(s: &str) -> Option<Self> {
        let key = s.trim().to_lowercase().replace([' ', '-'], "_");

        match key.as_str() {
            "cortex_analyst" | "analyst" => Some(ServiceType::CortexAnalyst),
            "cortex_search" | "search" => Some(ServiceType::CortexSearch),
            "cortex_functions" | "functions" | "llm_functions" => {
                Some(ServiceType::CortexFunctions)
            }
            "document_ai" | "doc_ai" => Some(ServiceType::DocumentAi),
            "fine_tuning" | "finetuning" | "cortex_fine_tuning" => Some(ServiceType::FineTuning),
            _ => None,
        }
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
