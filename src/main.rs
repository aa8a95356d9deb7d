use std::sync::Arc;

use chatgpt::{client::ChatGPT, config::ChatGPTEngine};
use log::{info, warn};
use study_quiz_bot::config::Config;
use study_quiz_bot::quiz::{
    ai_helper::QuizHelper,
    manager::QuizManager,
    question::{Question, QuestionType},
    results::ResultsLog,
    stats, QuizMode, QuizSession, SessionStatus,
};
use teloxide::{
    dispatching::dialogue::{serializer::Json, ErasedStorage, SqliteStorage, Storage},
    prelude::*,
    types::{ChatAction, KeyboardButton, KeyboardMarkup, KeyboardRemove, ReplyMarkup},
    utils::command::BotCommands,
};
use tokio::sync::Mutex;

type QuizDialogue = Dialogue<State, ErasedStorage<State>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
type DialogueStorage = Arc<ErasedStorage<State>>;
type SharedManager = Arc<Mutex<QuizManager>>;

#[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
pub enum State {
    #[default]
    Start,
    MainMenu,
    ReceiveTopic,
    ReceiveQuestionCount {
        topic: String,
    },
    ReceiveQuizLength {
        mode: QuizMode,
    },
    InQuiz {
        session: QuizSession,
    },
    Manage,
}

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
enum Command {
    #[command(description = "show the main menu")]
    Start,
    #[command(description = "leave the current quiz or menu")]
    Cancel,
    #[command(description = "display this text")]
    Help,
}

const MAX_GENERATED_QUESTIONS: usize = 20;
const MAX_QUIZ_LENGTH: usize = 50;
const MESSAGE_CHUNK_LIMIT: usize = 3500;

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    if let Err(err) = run().await {
        log::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run() -> HandlerResult {
    let config = Config::from_env()?;
    info!("Starting study quiz bot...");

    // A malformed store stops startup instead of being overwritten
    let manager: SharedManager = Arc::new(Mutex::new(QuizManager::open(&config.questions_file)?));
    let results = Arc::new(ResultsLog::new(&config.results_file));

    let gpt = {
        let mut gpt = ChatGPT::new(&config.chatgpt_api_key)
            .map_err(|err| format!("Unable to set up ChatGPT client: {}", err))?;

        gpt.config.engine = ChatGPTEngine::Gpt35Turbo;
        gpt.config.timeout = config.chatgpt_timeout;

        gpt
    };
    let helper = Arc::new(QuizHelper::new(gpt));

    let bot = Bot::from_env();

    info!("Opening dialogue storage at {}", config.dialogue_db);
    let storage: DialogueStorage = SqliteStorage::open(&config.dialogue_db, Json)
        .await
        .map_err(|err| format!("Failed to open dialogue storage: {:?}", err))?
        .erase();

    Dispatcher::builder(
        bot,
        Update::filter_message()
            .enter_dialogue::<Message, ErasedStorage<State>, State>()
            .branch(dptree::entry().filter_command::<Command>().endpoint(command))
            .branch(dptree::case![State::Start].endpoint(start))
            .branch(dptree::case![State::MainMenu].endpoint(main_menu))
            .branch(dptree::case![State::ReceiveTopic].endpoint(receive_topic))
            .branch(
                dptree::case![State::ReceiveQuestionCount { topic }]
                    .endpoint(receive_question_count),
            )
            .branch(dptree::case![State::ReceiveQuizLength { mode }].endpoint(receive_quiz_length))
            .branch(dptree::case![State::InQuiz { session }].endpoint(in_quiz))
            .branch(dptree::case![State::Manage].endpoint(manage)),
    )
    .dependencies(dptree::deps![storage, manager, helper, results])
    .enable_ctrlc_handler()
    .build()
    .dispatch()
    .await;

    Ok(())
}

const GREETING_TEXT: &str =
    "Hi! I'm your study companion. I write quiz questions on any topic and help you drill them.";

const PRACTICE_BUTTON: &str = "Practice mode";
const TEST_BUTTON: &str = "Test mode";
const GENERATE_BUTTON: &str = "Generate questions";
const STATS_BUTTON: &str = "Statistics";
const MANAGE_BUTTON: &str = "Manage questions";
const LIST_BUTTON: &str = "List questions";
const BACK_BUTTON: &str = "Back to menu";

fn main_menu_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![
            KeyboardButton::new(PRACTICE_BUTTON),
            KeyboardButton::new(TEST_BUTTON),
        ],
        vec![
            KeyboardButton::new(GENERATE_BUTTON),
            KeyboardButton::new(STATS_BUTTON),
        ],
        vec![KeyboardButton::new(MANAGE_BUTTON)],
    ])
}

fn amount_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new("5")],
        vec![KeyboardButton::new("10")],
        vec![KeyboardButton::new("15")],
    ])
}

fn manage_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![
        KeyboardButton::new(LIST_BUTTON),
        KeyboardButton::new(BACK_BUTTON),
    ]])
}

async fn show_main_menu(
    bot: &Bot,
    dialogue: &QuizDialogue,
    chat_id: ChatId,
    text: &str,
) -> HandlerResult {
    bot.send_message(chat_id, text)
        .reply_markup(main_menu_keyboard())
        .await?;
    dialogue.update(State::MainMenu).await?;
    Ok(())
}

async fn command(bot: Bot, dialogue: QuizDialogue, msg: Message, cmd: Command) -> HandlerResult {
    match cmd {
        Command::Help => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string())
                .await?;
        }
        Command::Start => show_main_menu(&bot, &dialogue, msg.chat.id, GREETING_TEXT).await?,
        Command::Cancel => {
            show_main_menu(&bot, &dialogue, msg.chat.id, "Okay, back to the main menu.").await?
        }
    }
    Ok(())
}

async fn start(bot: Bot, dialogue: QuizDialogue, msg: Message) -> HandlerResult {
    show_main_menu(&bot, &dialogue, msg.chat.id, GREETING_TEXT).await
}

async fn main_menu(
    bot: Bot,
    dialogue: QuizDialogue,
    msg: Message,
    manager: SharedManager,
) -> HandlerResult {
    match msg.text() {
        Some(GENERATE_BUTTON) => {
            bot.send_message(msg.chat.id, "What topic would you like to study?")
                .reply_markup(KeyboardRemove::new())
                .await?;
            dialogue.update(State::ReceiveTopic).await?;
        }
        Some(STATS_BUTTON) => {
            let summary = stats::summarize(manager.lock().await.questions());
            let text = if summary.total == 0 {
                "No questions available yet. Generate some questions first!".to_string()
            } else {
                summary.to_string()
            };
            send_chunked(&bot, msg.chat.id, &text).await?;
        }
        Some(PRACTICE_BUTTON) => {
            ask_quiz_length(&bot, &dialogue, msg.chat.id, &manager, QuizMode::Practice).await?
        }
        Some(TEST_BUTTON) => {
            ask_quiz_length(&bot, &dialogue, msg.chat.id, &manager, QuizMode::Test).await?
        }
        Some(MANAGE_BUTTON) => {
            if manager.lock().await.questions().is_empty() {
                bot.send_message(msg.chat.id, "No questions available!")
                    .reply_markup(main_menu_keyboard())
                    .await?;
                return Ok(());
            }
            send_question_list(&bot, msg.chat.id, &manager).await?;
            dialogue.update(State::Manage).await?;
        }
        _ => {
            bot.send_message(msg.chat.id, "Please choose one of the options")
                .reply_markup(main_menu_keyboard())
                .await?;
        }
    }
    Ok(())
}

async fn ask_quiz_length(
    bot: &Bot,
    dialogue: &QuizDialogue,
    chat_id: ChatId,
    manager: &SharedManager,
    mode: QuizMode,
) -> HandlerResult {
    let (total, enabled) = {
        let manager = manager.lock().await;
        (manager.questions().len(), manager.enabled_count())
    };

    if total == 0 {
        return show_main_menu(
            bot,
            dialogue,
            chat_id,
            "No questions available. Generate some questions first!",
        )
        .await;
    }
    if enabled == 0 {
        return show_main_menu(
            bot,
            dialogue,
            chat_id,
            "No enabled questions available. Enable some in Manage questions.",
        )
        .await;
    }

    let text = match mode {
        QuizMode::Practice => "Practice mode focuses on difficult questions.\nHow many questions?".to_string(),
        QuizMode::Test => format!(
            "Test mode asks random questions without repetition ({} available).\nHow many questions?",
            enabled
        ),
    };
    bot.send_message(chat_id, text)
        .reply_markup(amount_keyboard())
        .await?;
    dialogue.update(State::ReceiveQuizLength { mode }).await?;
    Ok(())
}

async fn receive_topic(bot: Bot, dialogue: QuizDialogue, msg: Message) -> HandlerResult {
    let topic = match msg.text().map(str::trim) {
        Some(topic) if !topic.is_empty() => topic.to_string(),
        _ => {
            bot.send_message(msg.chat.id, "Please enter a topic (as text)")
                .await?;
            return Ok(());
        }
    };

    bot.send_message(
        msg.chat.id,
        format!("How many questions? (1-{})", MAX_GENERATED_QUESTIONS),
    )
    .reply_markup(amount_keyboard())
    .await?;
    dialogue
        .update(State::ReceiveQuestionCount { topic })
        .await?;
    Ok(())
}

async fn receive_question_count(
    bot: Bot,
    dialogue: QuizDialogue,
    topic: String,
    msg: Message,
    manager: SharedManager,
    helper: Arc<QuizHelper>,
) -> HandlerResult {
    let Some(count) = parse_amount(msg.text()) else {
        bot.send_message(msg.chat.id, "Please enter a positive number")
            .await?;
        return Ok(());
    };
    let count = count.min(MAX_GENERATED_QUESTIONS);

    bot.send_message(
        msg.chat.id,
        format!("Generating {} questions about {}...", count, topic),
    )
    .reply_markup(KeyboardRemove::new())
    .await?;

    // Only cosmetic, so a failure here is ignored
    let _ = bot
        .send_chat_action(msg.chat.id, ChatAction::Typing)
        .await;

    let questions = helper.generate_questions(&topic, count).await;
    let text = if questions.is_empty() {
        "Failed to generate questions. Check your API key and try again.".to_string()
    } else {
        let generated = questions.len();
        manager.lock().await.add_questions(questions)?;
        info!("Added {} generated questions about {:?}", generated, topic);
        format!("Generated {} questions about {}!", generated, topic)
    };

    show_main_menu(&bot, &dialogue, msg.chat.id, &text).await
}

async fn receive_quiz_length(
    bot: Bot,
    dialogue: QuizDialogue,
    mode: QuizMode,
    msg: Message,
    manager: SharedManager,
    results: Arc<ResultsLog>,
) -> HandlerResult {
    let Some(count) = parse_amount(msg.text()) else {
        bot.send_message(msg.chat.id, "Please enter a positive number")
            .await?;
        return Ok(());
    };

    let (count, clamped) = clamp_quiz_length(count);
    if clamped {
        bot.send_message(
            msg.chat.id,
            format!("A quiz has at most {} questions, using {}.", MAX_QUIZ_LENGTH, count),
        )
        .await?;
    }

    let session = QuizSession::start(mode, &*manager.lock().await, count);
    let Some(session) = session else {
        return show_main_menu(
            &bot,
            &dialogue,
            msg.chat.id,
            "No enabled questions available. Enable some in Manage questions.",
        )
        .await;
    };

    let intro = if session.total() < count {
        format!(
            "Only {} questions available, let's start with those!",
            session.total()
        )
    } else {
        "Let's start the quiz!".to_string()
    };
    bot.send_message(msg.chat.id, intro).await?;

    advance(&bot, &dialogue, msg.chat.id, &manager, &results, session).await
}

async fn in_quiz(
    bot: Bot,
    dialogue: QuizDialogue,
    mut session: QuizSession,
    msg: Message,
    manager: SharedManager,
    helper: Arc<QuizHelper>,
    results: Arc<ResultsLog>,
) -> HandlerResult {
    let Some(answer) = msg.text() else {
        bot.send_message(msg.chat.id, "Please answer with text")
            .await?;
        return Ok(());
    };
    let Some(id) = session.current_question_id().map(str::to_owned) else {
        return finish_quiz(&bot, &dialogue, msg.chat.id, &results, &session).await;
    };

    let question = manager.lock().await.find_by_id(&id).cloned();
    match question {
        Some(question) => {
            if question.question_type == QuestionType::Freeform {
                let _ = bot
                    .send_chat_action(msg.chat.id, ChatAction::Typing)
                    .await;
            }
            let correct = helper.evaluate_answer(&question, answer).await;
            manager.lock().await.record_attempt(&question.id, correct)?;
            session.submit(correct);

            let feedback = if correct {
                "Correct!".to_string()
            } else {
                format!("Incorrect. The correct answer is: {}", question.correct_answer)
            };
            bot.send_message(msg.chat.id, feedback).await?;
        }
        None => {
            warn!("Question {} is gone from the store, skipping it", id);
            session.skip();
        }
    }

    advance(&bot, &dialogue, msg.chat.id, &manager, &results, session).await
}

/// Asks the next question of `session`, or wraps the quiz up when none is left.
async fn advance(
    bot: &Bot,
    dialogue: &QuizDialogue,
    chat_id: ChatId,
    manager: &SharedManager,
    results: &ResultsLog,
    mut session: QuizSession,
) -> HandlerResult {
    let next = {
        let manager = manager.lock().await;
        loop {
            let Some(id) = session.current_question_id().map(str::to_owned) else {
                break None;
            };
            match manager.find_by_id(&id) {
                Some(question) => break Some(question.clone()),
                None => {
                    warn!("Question {} is gone from the store, skipping it", id);
                    session.skip();
                }
            }
        }
    };

    let Some(question) = next else {
        return finish_quiz(bot, dialogue, chat_id, results, &session).await;
    };

    let index = session.index().unwrap_or_default();
    let markup: ReplyMarkup = if question.options().is_empty() {
        KeyboardRemove::new().into()
    } else {
        KeyboardMarkup::new(
            answer_labels(&question)
                .into_iter()
                .map(|label| vec![KeyboardButton::new(label)])
                .collect::<Vec<_>>(),
        )
        .into()
    };
    bot.send_message(chat_id, format_question(&question, index, session.total()))
        .reply_markup(markup)
        .await?;

    dialogue.update(State::InQuiz { session }).await?;
    Ok(())
}

async fn finish_quiz(
    bot: &Bot,
    dialogue: &QuizDialogue,
    chat_id: ChatId,
    results: &ResultsLog,
    session: &QuizSession,
) -> HandlerResult {
    let SessionStatus::Complete { score, total } = *session.status() else {
        return show_main_menu(bot, dialogue, chat_id, "The quiz is over.").await;
    };

    let mut text = format!(
        "Quiz complete! You scored {}/{}\n{}",
        score,
        total,
        encouragement(score, total)
    );

    if session.mode() == QuizMode::Test {
        match results.append(score, total) {
            Ok(()) => text.push_str("\nResult saved."),
            Err(err) => warn!("Failed to log test result: {}", err),
        }
    }

    show_main_menu(bot, dialogue, chat_id, &text).await
}

async fn manage(
    bot: Bot,
    dialogue: QuizDialogue,
    msg: Message,
    manager: SharedManager,
) -> HandlerResult {
    let number = match msg.text().map(str::trim) {
        Some(BACK_BUTTON) => {
            return show_main_menu(&bot, &dialogue, msg.chat.id, "Back to the main menu.").await;
        }
        Some(LIST_BUTTON) => {
            return send_question_list(&bot, msg.chat.id, &manager).await;
        }
        Some(text) => text.parse::<usize>().ok(),
        None => None,
    };

    let Some(number) = number else {
        bot.send_message(
            msg.chat.id,
            "Send a question number to enable or disable it",
        )
        .reply_markup(manage_keyboard())
        .await?;
        return Ok(());
    };

    let reply = {
        let mut store = manager.lock().await;
        let id = number
            .checked_sub(1)
            .and_then(|idx| store.questions().get(idx))
            .map(|q| q.id.clone());
        match id {
            Some(id) => match store.toggle_enabled(&id)? {
                Some(question) if question.enabled => format!("Question {} enabled!", number),
                Some(_) => format!("Question {} disabled!", number),
                None => "Invalid question number!".to_string(),
            },
            None => "Invalid question number!".to_string(),
        }
    };

    bot.send_message(msg.chat.id, reply)
        .reply_markup(manage_keyboard())
        .await?;
    Ok(())
}

async fn send_question_list(bot: &Bot, chat_id: ChatId, manager: &SharedManager) -> HandlerResult {
    let listing = {
        let manager = manager.lock().await;
        manager
            .questions()
            .iter()
            .enumerate()
            .map(|(idx, q)| format_list_entry(idx + 1, q))
            .collect::<Vec<_>>()
    };

    let mut chunk = String::new();
    for entry in listing {
        if !chunk.is_empty() && chunk.len() + entry.len() > MESSAGE_CHUNK_LIMIT {
            bot.send_message(chat_id, chunk.as_str()).await?;
            chunk.clear();
        }
        chunk.push_str(&entry);
        chunk.push('\n');
    }
    chunk.push_str("\nSend a question number to enable or disable it.");

    bot.send_message(chat_id, chunk)
        .reply_markup(manage_keyboard())
        .await?;
    Ok(())
}

/// Telegram rejects long messages, so split on line boundaries.
async fn send_chunked(bot: &Bot, chat_id: ChatId, text: &str) -> HandlerResult {
    let mut chunk = String::new();
    for line in text.lines() {
        if !chunk.is_empty() && chunk.len() + line.len() > MESSAGE_CHUNK_LIMIT {
            bot.send_message(chat_id, chunk.as_str()).await?;
            chunk.clear();
        }
        chunk.push_str(line);
        chunk.push('\n');
    }
    if !chunk.is_empty() {
        bot.send_message(chat_id, chunk).await?;
    }
    Ok(())
}

/// Answer buttons carry the option text itself, so a press names exactly one option.
fn answer_labels(question: &Question) -> Vec<String> {
    question
        .options()
        .iter()
        .map(|option| option.trim().to_string())
        .collect()
}

fn clamp_quiz_length(count: usize) -> (usize, bool) {
    if count > MAX_QUIZ_LENGTH {
        (MAX_QUIZ_LENGTH, true)
    } else {
        (count, false)
    }
}

fn parse_amount(text: Option<&str>) -> Option<usize> {
    text?.trim().parse::<usize>().ok().filter(|n| *n > 0)
}

fn format_question(question: &Question, index: usize, total: usize) -> String {
    let mut text = format!("Question {}/{}:\n{}", index + 1, total, question.text);
    if question.options().is_empty() {
        text.push_str("\n\nType your answer.");
    }
    for (n, option) in question.options().iter().enumerate() {
        text.push_str(&format!("\n {}. {}", n + 1, option));
    }
    text
}

fn format_list_entry(number: usize, question: &Question) -> String {
    let status = if question.enabled { "✓" } else { "✗" };
    let stats = if question.times_shown > 0 {
        format!(
            "{}/{} correct ({:.0}%)",
            question.times_correct,
            question.times_shown,
            question.correct_percentage()
        )
    } else {
        "not attempted".to_string()
    };
    format!(
        "{}. [{}] {}\n   Topic: {} | Type: {} | {}",
        number,
        status,
        shorten(&question.text, 60),
        question.topic,
        question.question_type.as_str(),
        stats
    )
}

fn shorten(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut short: String = text.chars().take(max_chars).collect();
    short.push_str("...");
    short
}

fn encouragement(score: usize, total: usize) -> &'static str {
    let pct = if total == 0 {
        0.0
    } else {
        score as f64 / total as f64 * 100.0
    };
    if pct >= 80.0 {
        "Great job!"
    } else if pct >= 50.0 {
        "Good effort! Keep practicing."
    } else {
        "Keep studying, you'll improve!"
    }
}
