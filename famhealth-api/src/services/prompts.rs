//! Prompt text for the language model
//!
//! Builders take plain data so they can be tested without a database.

use famhealth_shared::domain::advice::AdviceContent;

/// Characters of a quoted document kept in the chat prompt
pub const DOCUMENT_EXCERPT_CHARS: usize = 3000;
const TRUNCATION_MARK: &str = "...(内容已截断)";

pub const ADVICE_SYSTEM_PROMPT: &str = r#"你是一位专业的健康顾问AI助手。你的任务是根据用户提供的健康数据，生成个性化的健康建议报告。

请严格按照以下JSON格式输出，不要输出任何其他内容：

{
  "healthScore": <0-100的整数，代表整体健康评分>,
  "summary": "<200字以内的健康状况总结>",
  "concerns": [
    {
      "level": "<critical/warning/info>",
      "title": "<关注事项标题>",
      "description": "<详细描述>"
    }
  ],
  "suggestions": [
    {
      "category": "<饮食/运动/作息/用药/检查/其他>",
      "title": "<建议标题>",
      "content": "<具体建议内容>"
    }
  ],
  "actionItems": [
    {
      "text": "<具体行动项>",
      "priority": "<high/medium/low>"
    }
  ]
}

评分规则：
- 90-100：健康状况优秀
- 80-89：健康状况良好
- 70-79：健康状况一般，需要关注
- 60-69：健康状况欠佳，需要改善
- 60以下：健康状况较差，建议就医

注意事项：
1. 如果数据不足，请在summary中说明，并给出保守的评分
2. concerns按严重程度排序，critical > warning > info
3. suggestions要具体可执行，不要泛泛而谈
4. actionItems控制在3-5项，优先级高的放前面
5. 所有建议仅供参考，不能替代专业医疗诊断"#;

pub const OCR_PROMPT: &str = "请识别这张医疗单据图片中的全部文字。\
保留检查项目、结果、单位和参考范围，表格按行输出，每行一个项目。\
只输出识别到的文字，不要添加任何解释或评论。";

pub const FORMAT_SYSTEM_PROMPT: &str = r#"你是一位医疗文档整理助手。用户会提供一段由 OCR 识别得到的体检或检验报告文字，其中可能有错行、断字和多余空格。

请将其整理为结构清晰的 Markdown：
1. 用标题区分报告的不同部分（如基本信息、检查项目、结论）
2. 检查项目使用表格，列为：项目、结果、单位、参考范围
3. 对超出参考范围的结果在结果后标注 ↑ 或 ↓
4. 保持原始数值不变，不要编造内容，无法辨认的部分原样保留

只输出整理后的 Markdown，不要输出其他说明。"#;

/// Member facts shared by advice and chat prompts
#[derive(Debug, Clone)]
pub struct MemberProfile {
    pub name: String,
    pub age: i32,
    pub gender_label: &'static str,
    /// `None` when unknown
    pub blood_type: Option<String>,
    pub chronic_diseases: Vec<String>,
}

/// One health record as shown to the model
#[derive(Debug, Clone)]
pub struct RecordLine {
    pub date: String,
    pub label: String,
    pub value: f64,
    pub unit: String,
    pub is_abnormal: bool,
}

/// Everything the chat assistant is told about a member
#[derive(Debug, Clone)]
pub struct ChatContext {
    pub profile: MemberProfile,
    pub records: Vec<RecordLine>,
    /// `date - name` lines of the latest documents
    pub document_summary: Option<String>,
    pub latest_report: Option<String>,
    pub advice: Option<AdviceContent>,
}

/// Numbers print without a trailing `.0`
fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

fn profile_lines(profile: &MemberProfile) -> String {
    let mut out = format!(
        "- 姓名：{}\n- 年龄：{}岁\n- 性别：{}\n",
        profile.name, profile.age, profile.gender_label
    );
    if let Some(blood_type) = &profile.blood_type {
        out.push_str(&format!("- 血型：{}\n", blood_type));
    }
    if !profile.chronic_diseases.is_empty() {
        out.push_str(&format!("- 慢性病史：{}\n", profile.chronic_diseases.join("、")));
    }
    out
}

fn record_lines(records: &[RecordLine]) -> String {
    if records.is_empty() {
        return "暂无健康记录数据".to_string();
    }

    records
        .iter()
        .map(|r| {
            format!(
                "- {} {}：{}{}{}",
                r.date,
                r.label,
                format_value(r.value),
                r.unit,
                if r.is_abnormal { " ⚠️异常" } else { "" }
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cuts `text` to [`DOCUMENT_EXCERPT_CHARS`] characters
pub fn truncate_report(text: &str) -> String {
    if text.chars().count() <= DOCUMENT_EXCERPT_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(DOCUMENT_EXCERPT_CHARS).collect();
    out.push_str(TRUNCATION_MARK);
    out
}

/// User turn of an advice request
pub fn advice_user_prompt(
    profile: &MemberProfile,
    records: &[RecordLine],
    document_summary: Option<&str>,
    document_content: Option<&str>,
) -> String {
    let mut out = String::from("请分析以下健康数据并生成建议报告：\n\n## 基本信息\n");
    out.push_str(&profile_lines(profile));
    out.push_str("\n## 近期健康记录\n");
    out.push_str(&record_lines(records));
    out.push('\n');

    if let Some(summary) = document_summary {
        out.push_str(&format!("\n## 健康文档摘要\n{}\n", summary));
    }
    if let Some(content) = document_content {
        out.push_str(&format!("\n## 检查报告详情\n{}\n", content));
    }

    out.push_str("\n请根据以上数据生成健康建议报告。");
    out
}

fn advice_section(advice: &AdviceContent) -> String {
    let concerns = advice
        .concerns
        .iter()
        .map(|c| format!("- [{}] {}：{}", c.level, c.title, c.description))
        .collect::<Vec<_>>()
        .join("\n");
    let suggestions = advice
        .suggestions
        .iter()
        .map(|s| format!("- [{}] {}：{}", s.category, s.title, s.content))
        .collect::<Vec<_>>()
        .join("\n");
    let actions = advice
        .action_items
        .iter()
        .map(|a| format!("- [{}优先级] {}", a.priority, a.text))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "\n## 当前咨询的健康建议\n\n**健康概述**\n{}\n\n**需要关注的问题**\n{}\n\n**健康建议**\n{}\n\n**行动清单**\n{}\n",
        advice.summary, concerns, suggestions, actions
    )
}

/// System prompt for a chat session about one member
pub fn chat_system_prompt(ctx: &ChatContext) -> String {
    let mut out = String::from(
        "你是一位专业、友善的健康顾问AI助手。你正在为一位家庭成员提供健康咨询服务。\n\n## 成员健康档案\n\n**基本信息**\n",
    );
    out.push_str(&profile_lines(&ctx.profile));
    out.push_str(&format!("\n**近期健康记录（{} 条）**\n", ctx.records.len()));
    out.push_str(&record_lines(&ctx.records));
    out.push('\n');

    if let Some(summary) = &ctx.document_summary {
        out.push_str(&format!("\n**近期健康文档**\n{}\n", summary));
    }
    if let Some(report) = &ctx.latest_report {
        out.push_str(&format!("\n**最新体检报告解析**\n{}\n", truncate_report(report)));
    }
    if let Some(advice) = &ctx.advice {
        out.push_str(&advice_section(advice));
    }

    out.push_str(
        "\n## 回答要求\n\n\
         1. **专业性**：基于成员的健康档案，提供个性化的建议\n\
         2. **简洁性**：回答简明扼要，重点突出，避免冗长\n\
         3. **实用性**：给出具体、可执行的建议\n\
         4. **安全性**：\n   \
         - 对于严重症状，建议及时就医\n   \
         - 不做医学诊断，只提供参考建议\n   \
         - 在涉及用药时，建议咨询医生或药师\n\n\
         ## 免责说明\n\
         你的建议仅供参考，不能替代专业医疗诊断和治疗。如有健康问题，请及时咨询专业医生。",
    );
    out
}
