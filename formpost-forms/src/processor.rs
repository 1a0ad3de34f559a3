//! Turns validated submissions into spooled messages
//!
//! Processing never touches the network: messages are composed, then handed
//! to the [`MailQueue`] for a later flush.

use std::{collections::HashMap, sync::Arc};

use formpost_common::{Address, internal};
use formpost_delivery::MailQueue;
use formpost_spool::{Attachment, Message, MessageBuilder, MessageId};
use tracing::{debug, warn};

use crate::{
    config::{FormConfig, FormsConfig},
    error::{MappingError, ProcessError},
    fieldmap::Role,
    render::{PlaceholderRenderer, RenderContext, Renderer},
    submission::Submission,
};

/// Templates shared by both kinds of message
struct Templates<'a> {
    subject: &'a str,
    body: &'a str,
    html: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct FormProcessor {
    config: Arc<FormsConfig>,
    renderer: Arc<dyn Renderer>,
    queue: MailQueue,
}

impl FormProcessor {
    /// A processor rendering templates with [`PlaceholderRenderer`]
    #[must_use]
    pub fn new(config: FormsConfig, queue: MailQueue) -> Self {
        if config.debug.enabled && config.debug.address.is_none() {
            warn!("Debug mode is enabled without an address; messages go to their real recipients");
        }

        Self {
            config: Arc::new(config),
            renderer: Arc::new(PlaceholderRenderer),
            queue,
        }
    }

    /// Use `renderer` for subjects and bodies
    #[must_use]
    pub fn with_renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }

    /// `true` when messages are being redirected to the debug address
    #[must_use]
    pub fn is_debug(&self) -> bool {
        self.config.debug.redirect().is_some()
    }

    /// Compose and queue every message `submission` calls for
    ///
    /// All messages are composed before the first is queued, so a mapping or
    /// render problem never leaves a partial set in the spool.
    ///
    /// # Errors
    /// - [`ProcessError::UnknownForm`] if the form isn't configured
    /// - [`ProcessError::Mapping`] if a required role doesn't resolve
    /// - [`ProcessError::Render`] / [`ProcessError::Compose`] for bad templates
    ///   or configuration
    /// - [`ProcessError::Enqueue`] if the spool refused a message; messages
    ///   queued before it stay queued
    #[tracing::instrument(level = "debug", skip_all, fields(form = %submission.form))]
    pub async fn on_submission(
        &self,
        submission: &Submission,
    ) -> Result<Vec<MessageId>, ProcessError> {
        let messages = self.compose(submission)?;
        let mut ids = Vec::with_capacity(messages.len());

        for message in messages {
            ids.push(self.queue.enqueue(message).await?);
        }

        internal!(
            level = INFO,
            "Queued {} messages for form {}",
            ids.len(),
            submission.form
        );

        Ok(ids)
    }

    /// Build the messages for `submission` without queueing them
    ///
    /// # Errors
    /// As [`on_submission`](Self::on_submission), minus enqueue failures
    pub fn compose(&self, submission: &Submission) -> Result<Vec<Message>, ProcessError> {
        let form = self
            .config
            .forms
            .get(&submission.form)
            .ok_or_else(|| ProcessError::UnknownForm(submission.form.clone()))?;

        let resolved: HashMap<Role, String> = [Role::Email, Role::Name, Role::Subject]
            .into_iter()
            .filter_map(|role| {
                self.config
                    .fieldmap
                    .resolve(role, submission)
                    .map(|value| (role, value))
            })
            .collect();

        let submitter = resolved.get(&Role::Email).map(|addr| Address {
            display_name: resolved.get(&Role::Name).cloned(),
            addr: addr.clone(),
        });

        let mut context = RenderContext::from_submission(submission);
        for (role, value) in &resolved {
            context.insert_default(role.to_string(), value.clone());
        }

        let mut messages = self.compose_form(form, submission, submitter, &context)?;

        if let Some(address) = self.config.debug.redirect() {
            for message in &mut messages {
                debug!(
                    "Redirecting message for {} to debug address {address}",
                    message.to.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
                );
                message.to = vec![address.clone()];
                message.cc.clear();
                message.bcc.clear();
            }
        }

        Ok(messages)
    }

    fn compose_form(
        &self,
        form: &FormConfig,
        submission: &Submission,
        submitter: Option<Address>,
        context: &RenderContext,
    ) -> Result<Vec<Message>, ProcessError> {
        let mut messages = Vec::new();

        if let Some(notification) = &form.notification {
            let reply_to = submitter
                .clone()
                .filter(|_| notification.reply_to_submitter);

            let builder = Message::builder()
                .from(notification.from.clone())
                .to_many(notification.to.iter().cloned())
                .cc_many(notification.cc.iter().cloned())
                .bcc_many(notification.bcc.iter().cloned())
                .reply_to(reply_to);

            let templates = Templates {
                subject: &notification.subject,
                body: &notification.body,
                html: notification.html.as_deref(),
            };

            messages.push(self.finish(
                builder,
                &templates,
                notification.attach_files,
                submission,
                context,
            )?);
        }

        if let Some(confirmation) = &form.confirmation {
            let recipient = submitter.ok_or_else(|| MappingError::Unresolved {
                form: submission.form.clone(),
                role: Role::Email,
            })?;

            let builder = Message::builder()
                .from(confirmation.from.clone())
                .to(recipient);

            let templates = Templates {
                subject: &confirmation.subject,
                body: &confirmation.body,
                html: confirmation.html.as_deref(),
            };

            messages.push(self.finish(
                builder,
                &templates,
                confirmation.attach_files,
                submission,
                context,
            )?);
        }

        Ok(messages)
    }

    fn finish(
        &self,
        builder: MessageBuilder,
        templates: &Templates<'_>,
        attach_files: bool,
        submission: &Submission,
        context: &RenderContext,
    ) -> Result<Message, ProcessError> {
        let render = |template: &'static str, text: &str| {
            self.renderer
                .render(text, context)
                .map_err(|source| ProcessError::Render {
                    form: submission.form.clone(),
                    template,
                    source,
                })
        };

        // Header values must stay on one line
        let subject = render("subject", templates.subject)?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        let mut builder = builder
            .form(submission.form.clone())
            .subject(subject)
            .text(render("body", templates.body)?);

        if let Some(html) = templates.html {
            builder = builder.html(render("html body", html)?);
        }

        if attach_files {
            builder = builder.attachments(
                submission
                    .uploads()
                    .map(|path| Attachment::from_path(path.clone())),
            );
        }

        builder.build().map_err(|source| ProcessError::Compose {
            form: submission.form.clone(),
            source,
        })
    }
}
