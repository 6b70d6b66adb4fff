use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepCategory {
    Command,
    Planner,
    UserInput,
    FileRead,
    FileEdit,
    Search,
    Browser,
    Web,
    Mcp,
    Memory,
    Checkpoint,
    Deploy,
    System,
    Other,
}

impl StepCategory {
    pub fn label(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Planner => "planner",
            Self::UserInput => "user-input",
            Self::FileRead => "file-read",
            Self::FileEdit => "file-edit",
            Self::Search => "search",
            Self::Browser => "browser",
            Self::Web => "web",
            Self::Mcp => "mcp",
            Self::Memory => "memory",
            Self::Checkpoint => "checkpoint",
            Self::Deploy => "deploy",
            Self::System => "system",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepKindSpec {
    pub case: &'static str,
    pub title: &'static str,
    pub category: StepCategory,
}

const fn kind(case: &'static str, title: &'static str, category: StepCategory) -> StepKindSpec {
    StepKindSpec {
        case,
        title,
        category,
    }
}

// Payload case names as the server spells them. Cases missing here classify
// as `Other`, so new server-side step types never fail lookups.
const STEP_KINDS: [StepKindSpec; 90] = [
    kind("run_command", "Run command", StepCategory::Command),
    kind("command_status", "Command status", StepCategory::Command),
    kind("send_command_input", "Send command input", StepCategory::Command),
    kind("read_terminal", "Read terminal", StepCategory::Command),
    kind("kill_command", "Kill command", StepCategory::Command),
    kind("run_tests", "Run tests", StepCategory::Command),
    kind("planner_response", "Planner response", StepCategory::Planner),
    kind("tool_call_proposal", "Tool call proposal", StepCategory::Planner),
    kind("tool_call_choice", "Tool call choice", StepCategory::Planner),
    kind("plan_input", "Plan input", StepCategory::Planner),
    kind("propose_plan", "Propose plan", StepCategory::Planner),
    kind("task_boundary", "Task boundary", StepCategory::Planner),
    kind("notify_user", "Notify user", StepCategory::Planner),
    kind("suggested_responses", "Suggested responses", StepCategory::Planner),
    kind("manager_feedback", "Manager feedback", StepCategory::Planner),
    kind("generic", "Generic step", StepCategory::Planner),
    kind("user_input", "User input", StepCategory::UserInput),
    kind("conversation_history", "Conversation history", StepCategory::UserInput),
    kind("user_feedback", "User feedback", StepCategory::UserInput),
    kind("view_file", "View file", StepCategory::FileRead),
    kind("view_file_outline", "View file outline", StepCategory::FileRead),
    kind("view_code_item", "View code item", StepCategory::FileRead),
    kind("view_content_chunk", "View content chunk", StepCategory::FileRead),
    kind("list_directory", "List directory", StepCategory::FileRead),
    kind("read_notebook", "Read notebook", StepCategory::FileRead),
    kind("view_diff", "View diff", StepCategory::FileRead),
    kind("read_file_range", "Read file range", StepCategory::FileRead),
    kind("write_to_file", "Write to file", StepCategory::FileEdit),
    kind("propose_code", "Propose code", StepCategory::FileEdit),
    kind("code_action", "Code action", StepCategory::FileEdit),
    kind("replace_file_content", "Replace file content", StepCategory::FileEdit),
    kind("multi_replace_file_content", "Replace file content (multi)", StepCategory::FileEdit),
    kind("delete_file", "Delete file", StepCategory::FileEdit),
    kind("move_file", "Move file", StepCategory::FileEdit),
    kind("create_directory", "Create directory", StepCategory::FileEdit),
    kind("edit_notebook", "Edit notebook", StepCategory::FileEdit),
    kind("lint_diff", "Lint diff", StepCategory::FileEdit),
    kind("apply_patch", "Apply patch", StepCategory::FileEdit),
    kind("write_cascade_edit", "Write edit", StepCategory::FileEdit),
    kind("find", "Find files", StepCategory::Search),
    kind("grep_search", "Grep search", StepCategory::Search),
    kind("codebase_search", "Codebase search", StepCategory::Search),
    kind("trajectory_search", "Trajectory search", StepCategory::Search),
    kind("search_knowledge_base", "Search knowledge base", StepCategory::Search),
    kind("find_all_references", "Find all references", StepCategory::Search),
    kind("list_symbols", "List symbols", StepCategory::Search),
    kind("open_browser_url", "Open browser URL", StepCategory::Browser),
    kind("browser_action", "Browser action", StepCategory::Browser),
    kind("browser_click_element", "Browser click", StepCategory::Browser),
    kind("browser_input", "Browser input", StepCategory::Browser),
    kind("browser_scroll", "Browser scroll", StepCategory::Browser),
    kind("browser_navigate", "Browser navigate", StepCategory::Browser),
    kind("browser_press_key", "Browser press key", StepCategory::Browser),
    kind("browser_select_option", "Browser select option", StepCategory::Browser),
    kind("browser_hover", "Browser hover", StepCategory::Browser),
    kind("browser_wait", "Browser wait", StepCategory::Browser),
    kind("browser_get_dom", "Browser DOM", StepCategory::Browser),
    kind("capture_browser_screenshot", "Capture browser screenshot", StepCategory::Browser),
    kind("read_browser_page", "Read browser page", StepCategory::Browser),
    kind("list_browser_pages", "List browser pages", StepCategory::Browser),
    kind("close_browser_page", "Close browser page", StepCategory::Browser),
    kind("browser_subagent", "Browser subagent", StepCategory::Browser),
    kind("browser_console_logs", "Browser console logs", StepCategory::Browser),
    kind("read_browser_network", "Browser network log", StepCategory::Browser),
    kind("read_url_content", "Read URL content", StepCategory::Web),
    kind("search_web", "Search web", StepCategory::Web),
    kind("view_web_document_content_chunk", "View web document chunk", StepCategory::Web),
    kind("mcp_tool", "MCP tool", StepCategory::Mcp),
    kind("list_resources", "List MCP resources", StepCategory::Mcp),
    kind("read_resource", "Read MCP resource", StepCategory::Mcp),
    kind("memory", "Memory", StepCategory::Memory),
    kind("retrieve_memory", "Retrieve memory", StepCategory::Memory),
    kind("knowledge_generation", "Knowledge generation", StepCategory::Memory),
    kind("knowledge_artifacts", "Knowledge artifacts", StepCategory::Memory),
    kind("add_annotation", "Add annotation", StepCategory::Memory),
    kind("checkpoint", "Checkpoint", StepCategory::Checkpoint),
    kind("clear_context", "Clear context", StepCategory::Checkpoint),
    kind("compact_context", "Compact context", StepCategory::Checkpoint),
    kind("read_deployment_config", "Read deployment config", StepCategory::Deploy),
    kind("deploy_web_app", "Deploy web app", StepCategory::Deploy),
    kind("check_deploy_status", "Check deploy status", StepCategory::Deploy),
    kind("ephemeral_message", "Ephemeral message", StepCategory::System),
    kind("error_message", "Error message", StepCategory::System),
    kind("system_message", "System message", StepCategory::System),
    kind("wait", "Wait", StepCategory::System),
    kind("git_commit", "Git commit", StepCategory::System),
    kind("generate_image", "Generate image", StepCategory::System),
    kind("run_extension_code", "Run extension code", StepCategory::System),
    kind("compile", "Compile", StepCategory::System),
    kind("post_pr_review", "Post PR review", StepCategory::System),
];

pub struct StepKindRegistry;

impl StepKindRegistry {
    pub fn list() -> &'static [StepKindSpec] {
        &STEP_KINDS
    }

    pub fn lookup(case: &str) -> Option<&'static StepKindSpec> {
        STEP_KINDS.iter().find(|spec| spec.case == case)
    }

    pub fn category(case: &str) -> StepCategory {
        Self::lookup(case).map_or(StepCategory::Other, |spec| spec.category)
    }

    pub fn title(case: &str) -> &str {
        Self::lookup(case).map_or(case, |spec| spec.title)
    }
}
