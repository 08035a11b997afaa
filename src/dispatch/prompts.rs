//! Prompt construction for triage, drafting, and rewriting.
//!
//! These builders run inside an active prompt scope and read the resolved
//! preference values through `current_prompts()` rather than taking them
//! as arguments; the dispatcher owns the scope.

use crate::config::AssistantProfile;
use crate::dispatch::types::EmailEvent;
use crate::error::RegistryError;
use crate::registry::{current_prompt, keys};

/// System prompt for the triage classification call.
pub fn build_triage_system_prompt(profile: &AssistantProfile) -> Result<String, RegistryError> {
    let background = current_prompt(keys::BACKGROUND_PREFERENCES)?;
    Ok(format!(
        "You are {full_name}'s executive assistant. You are a top-notch executive assistant \
         who cares about {name} performing as well as possible.\n\n\
         {background}.\n\n\
         {name} gets lots of emails. Your job is to classify the incoming email below.\n\n\
         ### Emails that are not worth responding to:\n{triage_no}\n\n\
         ### Emails that are worth responding to:\n{triage_email}\n\n\
         ### There are also other emails that {name} should know about, but don't require a \
         response. Examples of this include:\n{triage_notify}\n\n\
         If unsure, opt to notify {name} - you will learn from this in the future.\n\n\
         # Background information: information you may find helpful when deciding what \
         to do.\n\n{background_preferences}\n\n\
         Call the `triage_email` tool with your classification.",
        full_name = profile.full_name,
        name = profile.name,
        background = profile.background,
        triage_no = profile.triage_no,
        triage_email = profile.triage_email,
        triage_notify = profile.triage_notify,
        background_preferences = background.value,
    ))
}

/// System prompt for the drafting call.
pub fn build_draft_system_prompt(profile: &AssistantProfile) -> Result<String, RegistryError> {
    let response = current_prompt(keys::RESPONSE_PREFERENCES)?;
    let background = current_prompt(keys::BACKGROUND_PREFERENCES)?;
    let schedule = current_prompt(keys::SCHEDULE_PREFERENCES)?;
    Ok(format!(
        "You are {full_name}'s executive assistant. You are a top-notch executive assistant \
         who cares about {name} performing as well as possible.\n\n\
         {background}.\n\n\
         This email was classified as worth responding to. Gather what you need, then \
         respond for {name}.\n\n\
         ### `message_user` tool\n\
         If you do not have all the information needed to respond in the most appropriate \
         way, call the `message_user` tool to ask {name}. Do not put placeholders for names \
         or emails or information - get that directly from {name}. Never just make things \
         up.\n\n\
         ### `write_email_response` tool\n\
         Once you have enough information, draft the response with the \
         `write_email_response` tool. ALWAYS draft emails as if they are coming from \
         {name}. Never draft them as \"{name}'s assistant\" or someone else.\n\n\
         Here is what to include in responses:\n{response_preferences}\n\n\
         ### `start_new_email_thread` tool\n\
         Sometimes you will need to start a new email thread, for example to make an \
         introduction {name} agreed to. Use the `start_new_email_thread` tool for this.\n\n\
         ### `send_calendar_invite` tool\n\
         If you are sure {name} would want to schedule a meeting and you know the calendar \
         is free, schedule it with the `send_calendar_invite` tool.\n\
         Here is how {name} likes invites sent:\n{schedule_preferences}\n\n\
         ### `rewrite_email` tool\n\
         If {name} gives feedback that a pending draft has the wrong tone, call the \
         `rewrite_email` tool instead of drafting from scratch.\n\n\
         ### `mark_email_as_read` tool\n\
         Before finishing execution, the last thing you do should be to call the \
         `mark_email_as_read` tool.\n\n\
         # Background information: information you may find helpful when responding.\n\n\
         {background_preferences}\n\n\
         ONLY CALL ONE TOOL AT A TIME.",
        full_name = profile.full_name,
        name = profile.name,
        background = profile.background,
        response_preferences = response.value,
        schedule_preferences = schedule.value,
        background_preferences = background.value,
    ))
}

/// The email rendered as model input.
pub fn build_email_input(email: &EmailEvent) -> String {
    format!(
        "Here is an incoming email thread. Note that this is the whole thread, the latest \
         email is at the top.\n\n\
         <email>\n\
         <from>\n{from}\n</from>\n\
         <to>\n{to}\n</to>\n\
         <subject>\n{subject}\n</subject>\n\
         <email_thread>\n{body}\n</email_thread>\n\
         </email>\n\n\
         Follow the instructions and handle this email to the best of your ability.",
        from = email.from_email,
        to = email.to_email,
        subject = email.subject,
        body = email.body,
    )
}

/// System prompt for the meeting-time survey call.
pub fn build_meeting_time_prompt(
    profile: &AssistantProfile,
    current_date: &str,
) -> Result<String, RegistryError> {
    let schedule = current_prompt(keys::SCHEDULE_PREFERENCES)?;
    Ok(format!(
        "You are {full_name}'s executive assistant. You are a top-notch executive assistant \
         who cares about {name} performing as well as possible.\n\n\
         The below email thread has been flagged as requesting time to meet. Your SOLE \
         purpose is to survey {name}'s calendar and report availability.\n\n\
         If the email is suggesting some specific times, then check if {name} is available \
         then. If the email asks for time, report valid times to meet (always suggest them \
         in {timezone}).\n\n\
         Try to send available spots in as big of chunks as possible. Do not send time \
         slots less than 15 minutes in length.\n\n\
         Your response should be extremely high density. Just say factually whether {name} \
         is free, and what time slots. Do not give any extra commentary.\n\n\
         Here are other instructions for scheduling:\n\n\
         <scheduling_instructions>\n{schedule_preferences}\n</scheduling_instructions>\n\n\
         The current date is {current_date}",
        full_name = profile.full_name,
        name = profile.name,
        timezone = profile.timezone,
        schedule_preferences = schedule.value,
        current_date = current_date,
    ))
}

/// Prompt for rewriting a pending draft in the user's tone.
pub fn build_rewrite_prompt(
    profile: &AssistantProfile,
    draft: &str,
    email: &EmailEvent,
    tone_feedback: Option<&str>,
) -> Result<String, RegistryError> {
    let tone = current_prompt(keys::REWRITE_INSTRUCTIONS)?;
    let feedback = tone_feedback
        .filter(|f| !f.is_empty())
        .map(|f| format!("\n\nThe user gave this feedback about the draft: {f}"))
        .unwrap_or_default();
    Ok(format!(
        "Your job is to rewrite an email draft to sound more like {name}.\n\n\
         {name}'s assistant just drafted an email. It is factually correct, but it may not \
         sound like {name}. Your job is to rewrite the email keeping the information the \
         same (do not add anything that is made up!) but adjusting the tone.\n\n\
         {instructions}{feedback}\n\n\
         Here is the assistant's current draft:\n\n\
         <draft>\n{draft}\n</draft>\n\n\
         Here is the email thread:\n\n\
         From: {author}\n\
         To: {to}\n\
         Subject: {subject}\n\n\
         {body}",
        name = profile.name,
        instructions = tone.value,
        draft = draft,
        author = email.from_email,
        to = email.to_email,
        subject = email.subject,
        body = email.body,
    ))
}
