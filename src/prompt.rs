//! The synthesis prompt, rendered with Handlebars.

use handlebars::Handlebars;

use crate::prelude::*;

/// The system message: role, output contract, and the three-level
/// confidence-labeling policy. The policy matters: a card must distinguish
/// facts read off the evidence from inferences and from generic estimates,
/// and collapsing those levels would overstate what the evidence shows.
const SYSTEM_TEMPLATE: &str = "\
أنت خبير تربوي متخصص في توثيق الشواهد المهنية للمعلمين. مهمتك صياغة بطاقة شاهد رسمية بلغة عربية فصيحة ومهنية انطلاقاً من نص مستخرج آلياً من صور الشاهد.

أعد النتيجة ككائن JSON فقط، دون أي نص خارجه، بالمفاتيح التالية حصراً:
goal, implementation, tools, assessment, impact, rubric

- قيمة كل مفتاح وصفي جملة أو جملتان بالعربية الفصحى.
- rubric: مصفوفة من عنصرين على الأكثر، كل عنصر كائن بالمفتاحين label و justification، على أن يكون label حرفياً أحد التصنيفات الرسمية التالية دون تعديل:
{{#each categories}}- {{this}}
{{/each}}
سياسة الثقة:
- إذا ورد دليل صريح في النص فاذكر المعلومة مباشرة.
- إذا كانت المؤشرات غير صريحة فابدأ الجملة بعبارة \"استنتاج مرجّح:\".
- إذا غاب الدليل تماماً فابدأ الجملة بعبارة \"تقدير مهني عام:\".
";

/// The user message: caller-provided context plus the cleaned OCR text.
const USER_TEMPLATE: &str = "\
بيانات الشاهد:
- المعلم: {{teacher}}
- المادة: {{subject}}
- المدرسة: {{school}}
{{#if program_name}}- اسم البرنامج: {{program_name}}
{{/if}}{{#if program_description}}- وصف مقترح من المعلم: {{program_description}}
{{/if}}
النص المستخرج من صور الشاهد:
{{ocr_text}}
";

/// Template bindings for the synthesis prompt.
#[derive(Debug, Serialize)]
pub struct PromptBindings<'a> {
    /// Teacher name.
    pub teacher: &'a str,

    /// Subject taught.
    pub subject: &'a str,

    /// School name.
    pub school: &'a str,

    /// Program name override, if the caller supplied one.
    pub program_name: Option<&'a str>,

    /// Program description hint, if the caller supplied one.
    pub program_description: Option<&'a str>,

    /// The cleaned OCR text.
    pub ocr_text: &'a str,

    /// The official rubric category labels.
    pub categories: &'a [&'a str],
}

/// Render the synthesis prompt as `(system, user)` messages.
pub fn render_synthesis_prompt(bindings: &PromptBindings) -> Result<(String, String)> {
    let mut handlebars = Handlebars::new();
    // These are LLM messages, not HTML.
    handlebars.register_escape_fn(handlebars::no_escape);
    let system = handlebars
        .render_template(SYSTEM_TEMPLATE, bindings)
        .context("error rendering system prompt")?;
    let user = handlebars
        .render_template(USER_TEMPLATE, bindings)
        .context("error rendering user prompt")?;
    Ok((system, user))
}
