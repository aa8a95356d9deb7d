use super::question::Question;

/// Resolves a 1-based option number like `"2"` to the option text.
pub fn resolve_option<'a>(question: &'a Question, answer: &str) -> Option<&'a str> {
    let number: usize = answer.trim().parse().ok()?;
    let idx = number.checked_sub(1)?;
    question.options().get(idx).map(String::as_str)
}

/// An MCQ answer is correct when it is the correct option's text or its
/// 1-based position in the option list. An answer that spells out one of the
/// options always means that option, even when it also looks like a number.
pub fn is_mcq_answer_correct(question: &Question, answer: &str) -> bool {
    let answer = answer.trim();
    let expected = question.correct_answer.trim();
    if answer.is_empty() {
        return false;
    }
    if question.options().iter().any(|option| option.trim() == answer) {
        return answer == expected;
    }
    if answer == expected {
        return true;
    }
    resolve_option(question, answer).is_some_and(|option| option.trim() == expected)
}
