//! Transactional email bodies. Plain string HTML, no template engine; every
//! builder returns `(subject, html)`.

use crate::email::html_escape;

pub fn registration_confirmation(
    event_title: &str,
    attendee_name: &str,
    schedule_lines: &[String],
    location: &str,
    amount_display: &str,
) -> (String, String) {
    let subject = format!("You're registered: {event_title}");
    let html = format!(
        "<h2>See you there, {name}!</h2>\
         <p>Your registration for <strong>{title}</strong> is confirmed.</p>\
         {schedule}\
         <p><strong>Location:</strong> {location}</p>\
         <p><strong>Amount paid:</strong> {amount}</p>\
         <p>This email is your confirmation; no ticket is required at the door.</p>",
        name = html_escape(attendee_name),
        title = html_escape(event_title),
        schedule = schedule_block(schedule_lines),
        location = html_escape(location),
        amount = html_escape(amount_display),
    );
    (subject, html)
}

pub fn online_access(
    event_title: &str,
    attendee_name: &str,
    schedule_lines: &[String],
    watch_url: &str,
) -> (String, String) {
    let subject = format!("Your online access link: {event_title}");
    let html = format!(
        "<h2>Welcome, {name}!</h2>\
         <p>You're registered to join <strong>{title}</strong> online.</p>\
         {schedule}\
         <p><a href=\"{url}\">Click here to watch the livestream</a></p>\
         <p>This link is personal to you. Please don't share it.</p>",
        name = html_escape(attendee_name),
        title = html_escape(event_title),
        schedule = schedule_block(schedule_lines),
        url = html_escape(watch_url),
    );
    (subject, html)
}

pub fn past_event_access(title: &str, buyer_name: &str, watch_url: &str) -> (String, String) {
    let subject = format!("Your recording is ready: {title}");
    let html = format!(
        "<h2>Thank you, {name}!</h2>\
         <p>Your purchase of <strong>{title}</strong> is complete.</p>\
         <p><a href=\"{url}\">Click here to watch the recording</a></p>\
         <p>This link is personal to you. Please don't share it.</p>",
        name = html_escape(buyer_name),
        title = html_escape(title),
        url = html_escape(watch_url),
    );
    (subject, html)
}

pub fn volunteer_acknowledgement(first_name: &str) -> (String, String) {
    let subject = "Thank you for volunteering".to_string();
    let html = format!(
        "<h2>Thank you, {name}!</h2>\
         <p>We received your volunteer application. Someone from our team will \
         reach out soon to talk about where you can serve.</p>",
        name = html_escape(first_name),
    );
    (subject, html)
}

pub fn kingdom_builder_welcome(
    donor_name: &str,
    amount_display: &str,
    interval: &str,
) -> (String, String) {
    let subject = "Welcome to Kingdom Builders".to_string();
    let html = format!(
        "<h2>Welcome, {name}!</h2>\
         <p>Your recurring gift of <strong>{amount}</strong> ({interval}) is set up. \
         Thank you for partnering with us.</p>\
         <p>As a Kingdom Builder you receive discounts on events and recordings.</p>",
        name = html_escape(donor_name),
        amount = html_escape(amount_display),
        interval = html_escape(interval),
    );
    (subject, html)
}

pub fn donation_thank_you(donor_name: &str, amount_display: &str) -> (String, String) {
    let subject = "Thank you for your gift".to_string();
    let html = format!(
        "<h2>Thank you, {name}!</h2>\
         <p>We received your gift of <strong>{amount}</strong>. \
         Your generosity makes this ministry possible.</p>",
        name = html_escape(donor_name),
        amount = html_escape(amount_display),
    );
    (subject, html)
}

pub fn admin_notification(
    kind: &str,
    name: &str,
    email: &str,
    phone: Option<&str>,
    subject_line: Option<&str>,
    message: &str,
) -> (String, String) {
    let subject = format!("New {kind} submission from {name}");
    let html = format!(
        "<h3>{kind}</h3>\
         <p><strong>Name:</strong> {name}<br>\
         <strong>Email:</strong> {email}<br>\
         <strong>Phone:</strong> {phone}<br>\
         <strong>Subject:</strong> {subj}</p>\
         <p>{message}</p>",
        kind = html_escape(kind),
        name = html_escape(name),
        email = html_escape(email),
        phone = html_escape(phone.unwrap_or("-")),
        subj = html_escape(subject_line.unwrap_or("-")),
        message = html_escape(message),
    );
    (subject, html)
}

fn schedule_block(lines: &[String]) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let items: String = lines
        .iter()
        .map(|l| format!("<li>{}</li>", html_escape(l)))
        .collect();
    format!("<p><strong>Schedule:</strong></p><ul>{items}</ul>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn online_access_embeds_watch_link() {
        let (subject, html) = online_access(
            "Night of Worship",
            "Ana",
            &["Fri, Mar 6 · 7:00 PM – 9:00 PM".to_string()],
            "https://chapel.example/livestream/night-of-worship?token=abc123",
        );
        assert!(subject.contains("Night of Worship"));
        assert!(html.contains("token=abc123"));
        assert!(html.contains("7:00 PM"));
    }

    #[test]
    fn confirmation_escapes_attendee_input() {
        let (_, html) =
            registration_confirmation("Gala <2026>", "A & B", &[], "Main Hall", "$10.00");
        assert!(html.contains("Gala &lt;2026&gt;"));
        assert!(html.contains("A &amp; B"));
        assert!(!html.contains("<2026>"));
    }

    #[test]
    fn schedule_block_renders_one_item_per_session() {
        let block = schedule_block(&["a".to_string(), "b".to_string()]);
        assert_eq!(block.matches("<li>").count(), 2);
        assert!(schedule_block(&[]).is_empty());
    }
}
