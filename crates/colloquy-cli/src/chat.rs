//! The Student / TrainingExpert / EvaluationExpert scenario

use std::sync::Arc;

use colloquy_core::{
    ChatAgent, ChatAgentConfig, LlmConfig, OutputSink, RecipientValidator,
    RecipientValidatorConfig, Task, TaskConfig,
};

pub const STUDENT: &str = "Student";
pub const TRAINING_EXPERT: &str = "TrainingExpert";
pub const EVALUATION_EXPERT: &str = "EvaluationExpert";

const STUDENT_PROMPT: &str = "\
Your task is to write 4 short bullet points about
Language Models in the context of Machine Learning (ML),
especially about training, and evaluating them.
However you are a novice to this field, and know nothing about this topic.
To collect your bullet points, you will consult 2 people:
TrainingExpert and EvaluationExpert.
You will ask ONE question at a time, to ONE of these experts.
To clarify who your question is for, you must use
\"TO[<recipient>]:\" at the start of your message,
where <recipient> is either TrainingExpert or EvaluationExpert.
Once you have collected the points you need,
say DONE, and show me the 4 bullet points.";

const TRAINING_EXPERT_PROMPT: &str = "\
You are an expert on Training Language Models in Machine Learning.
You will receive questions on this topic, and you must answer these
very concisely, in one or two sentences, in a way that is easy for a novice to
understand.";

const EVALUATION_EXPERT_PROMPT: &str = "\
You are an expert on Evaluating Language Models in Machine Learning.
You will receive questions on this topic, and you must answer these
very concisely, in one or two sentences, in a way that is easy for a novice to
understand.";

pub fn validator_config() -> RecipientValidatorConfig {
    RecipientValidatorConfig::new([TRAINING_EXPERT, EVALUATION_EXPERT])
}

fn chat_agent(llm: &LlmConfig, name: &str, sink: &Arc<dyn OutputSink>) -> ChatAgent {
    let mut config = ChatAgentConfig::new(llm.clone());
    config.name = name.to_string();
    ChatAgent::new(config).with_sink(sink.clone())
}

/// Build the Student task with its validator and expert sub-tasks.
///
/// All three agents share one LLM config, so they share the provider and
/// cache as well.
pub fn build_three_agent_chat(llm: LlmConfig, sink: Arc<dyn OutputSink>, max_turns: usize) -> Task {
    let mut student = Task::new(
        chat_agent(&llm, STUDENT, &sink),
        TaskConfig::new(STUDENT)
            .system_message(STUDENT_PROMPT)
            .max_turns(max_turns),
    )
    .with_sink(sink.clone());

    let training_expert = Task::new(
        chat_agent(&llm, TRAINING_EXPERT, &sink),
        TaskConfig::new(TRAINING_EXPERT)
            .system_message(TRAINING_EXPERT_PROMPT)
            .single_round(true),
    )
    .with_sink(sink.clone());

    let evaluation_expert = Task::new(
        chat_agent(&llm, EVALUATION_EXPERT, &sink),
        TaskConfig::new(EVALUATION_EXPERT)
            .system_message(EVALUATION_EXPERT_PROMPT)
            .single_round(true),
    )
    .with_sink(sink.clone());

    let validator = Task::new(
        RecipientValidator::new(validator_config()),
        TaskConfig::default().single_round(true),
    )
    .with_sink(sink);

    student.add_sub_task(vec![validator, training_expert, evaluation_expert]);
    student
}
