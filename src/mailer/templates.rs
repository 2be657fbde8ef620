/// HTML templates for transactional email
use super::{AdminSignupData, CoursePurchaseData, EmailMessage};

/// Rendered subject and HTML body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

/// Escape text for interpolation into HTML
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn render(message: &EmailMessage) -> RenderedEmail {
    match message {
        EmailMessage::AdminSignupNotification(data) => admin_signup(data),
        EmailMessage::CoursePurchase { data, .. } => course_purchase(data),
    }
}

const STYLE: &str = r#"
      body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; }
      .container { max-width: 600px; margin: 0 auto; padding: 20px; }
      .header { background: #4f46e5; color: white; padding: 20px; text-align: center; border-radius: 5px 5px 0 0; }
      .content { background: #f9fafb; padding: 30px; border-radius: 0 0 5px 5px; }
      .info-box { background: white; padding: 20px; border-radius: 5px; margin: 20px 0; }
      .zoom-box { background: #e3f2fd; padding: 20px; border-radius: 5px; margin: 20px 0; border-left: 4px solid #2196f3; }
      .button { display: inline-block; padding: 12px 30px; background: #4f46e5; color: white; text-decoration: none; border-radius: 5px; }
      .footer { text-align: center; margin-top: 20px; color: #666; font-size: 12px; }"#;

fn admin_signup(data: &AdminSignupData) -> RenderedEmail {
    let signup_date = data.signup_date.format("%Y-%m-%d %H:%M UTC").to_string();

    let html = format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <style>{style}
    </style>
  </head>
  <body>
    <div class="container">
      <div class="header"><h1>New User Signup - Approval Required</h1></div>
      <div class="content">
        <p>Hello Admin,</p>
        <p>A new user has signed up and requires your approval:</p>
        <div class="info-box">
          <p><strong>Name:</strong> {name}</p>
          <p><strong>Email:</strong> {email}</p>
          <p><strong>Signup Date:</strong> {date}</p>
        </div>
        <p>Please review and approve this user in the admin dashboard.</p>
        <p style="margin-top: 30px;"><a href="{url}" class="button">Go to Admin Dashboard</a></p>
      </div>
      <div class="footer"><p>This is an automated notification from LearnHub</p></div>
    </div>
  </body>
</html>
"#,
        style = STYLE,
        name = escape_html(&data.name),
        email = escape_html(&data.email),
        date = signup_date,
        url = escape_html(&data.dashboard_url),
    );

    RenderedEmail {
        subject: format!("New User Signup - Approval Required: {}", data.name),
        html,
    }
}

fn course_purchase(data: &CoursePurchaseData) -> RenderedEmail {
    let zoom_box = match data.zoom_link.as_deref().filter(|l| !l.trim().is_empty()) {
        Some(link) => {
            let link = escape_html(link);
            format!(
                r#"
        <div class="zoom-box">
          <h3 style="margin-top: 0;">Join Your Live Classes</h3>
          <p>Use the Zoom link below to join your daily classes:</p>
          <p style="text-align: center;"><a href="{link}" class="button" target="_blank">Join Zoom Class</a></p>
          <p style="font-size: 14px; color: #666;"><strong>Zoom Link:</strong><br><a href="{link}">{link}</a></p>
          <p style="font-size: 12px; color: #666;">Please save this link for future reference. You'll use it to access all your class sessions.</p>
        </div>"#,
                link = link
            )
        }
        None => String::new(),
    };

    let html = format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <style>{style}
    </style>
  </head>
  <body>
    <div class="container">
      <div class="header"><h1>Course Purchase Confirmation</h1></div>
      <div class="content">
        <p>Hello {user},</p>
        <p>Thank you for your purchase! Your course has been successfully added to your account.</p>
        <div class="info-box">
          <h3>Course Details</h3>
          <p><strong>Course:</strong> {course}</p>
          <p><strong>Instructor:</strong> {instructor}</p>
          <p><strong>Price:</strong> {total}</p>
          <p><strong>Transaction ID:</strong> {transaction}</p>
        </div>{zoom_box}
        <p style="margin-top: 30px;">You can access your course and view all your enrolled courses in your dashboard.</p>
      </div>
      <div class="footer">
        <p>This is an automated confirmation email from LearnHub</p>
        <p>If you have any questions, please contact our support team.</p>
      </div>
    </div>
  </body>
</html>
"#,
        style = STYLE,
        user = escape_html(&data.user_name),
        course = escape_html(&data.course_title),
        instructor = escape_html(&data.instructor),
        total = data.total_amount,
        transaction = escape_html(&data.transaction_id),
        zoom_box = zoom_box,
    );

    RenderedEmail {
        subject: format!("Course Purchase Confirmation: {}", data.course_title),
        html,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Money;
    use chrono::{TimeZone, Utc};

    fn purchase(zoom_link: Option<&str>) -> CoursePurchaseData {
        CoursePurchaseData {
            user_name: "Ada <admin>".to_string(),
            course_title: "Rust & Tokio".to_string(),
            instructor: "Ferris".to_string(),
            total_amount: Money::from_cents(10_800),
            transaction_id: "tx-1".to_string(),
            zoom_link: zoom_link.map(str::to_string),
        }
    }

    #[test]
    fn test_purchase_template_escapes_and_formats() {
        let rendered = course_purchase(&purchase(None));
        assert_eq!(rendered.subject, "Course Purchase Confirmation: Rust & Tokio");
        assert!(rendered.html.contains("Ada &lt;admin&gt;"));
        assert!(rendered.html.contains("Rust &amp; Tokio"));
        assert!(rendered.html.contains("$108.00"));
        assert!(!rendered.html.contains("zoom-box\">"));
    }

    #[test]
    fn test_zoom_box_only_with_link() {
        let rendered = course_purchase(&purchase(Some("https://zoom.us/j/123")));
        assert!(rendered.html.contains("Join Zoom Class"));
        assert!(rendered.html.contains("https://zoom.us/j/123"));
    }

    #[test]
    fn test_admin_signup_template() {
        let rendered = admin_signup(&AdminSignupData {
            name: "Grace".to_string(),
            email: "grace@example.com".to_string(),
            signup_date: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            dashboard_url: "https://learnhub.test/dashboard".to_string(),
        });
        assert_eq!(rendered.subject, "New User Signup - Approval Required: Grace");
        assert!(rendered.html.contains("2024-03-01 09:30 UTC"));
        assert!(rendered.html.contains("https://learnhub.test/dashboard"));
    }
}
