use log::{debug, warn};
use std::sync::Arc;

use courier_proto::service::group_context;
use courier_proto::{data_message, AttachmentPointer, DataMessage, Envelope};

use crate::error::EngineError;
use crate::events::RetrievedAttachment;
use crate::receiver::ReceiverInner;

impl ReceiverInner {
    // Normalizes a decoded DataMessage: flag exclusivity, group roster
    // reconciliation against the store, attachment retrieval.
    pub(crate) async fn process_decrypted(
        self: &Arc<Self>,
        envelope: &Envelope,
        mut message: DataMessage,
    ) -> Result<(DataMessage, Vec<RetrievedAttachment>), EngineError> {
        let flags = message.flags();
        message.flags = Some(flags);
        message.expire_timer = Some(message.expire_timer.unwrap_or_default());

        if flags & data_message::FLAG_END_SESSION != 0 {
            message.body = None;
            message.attachments.clear();
            message.group = None;
            return Ok((message, Vec::new()));
        } else if flags & data_message::FLAG_EXPIRATION_TIMER_UPDATE != 0
            || flags & data_message::FLAG_PROFILE_KEY_UPDATE != 0
        {
            message.body = None;
            message.attachments.clear();
        } else if flags != 0 {
            return Err(EngineError::UnknownFlags(flags));
        }

        if message.group.is_some() {
            self.reconcile_group(envelope, &mut message).await?;
        }

        let mut attachments = Vec::with_capacity(message.attachments.len());
        for pointer in &message.attachments {
            attachments.push(self.handle_attachment(pointer).await?);
        }

        // Thumbnails and contact avatars are best-effort.
        if let Some(quote) = &message.quote {
            for quoted in &quote.attachments {
                if let Some(thumbnail) = &quoted.thumbnail {
                    if let Err(e) = self.handle_attachment(thumbnail).await {
                        warn!("failed to fetch quote thumbnail: {e}");
                    }
                }
            }
        }
        for contact in &message.contact {
            if let Some(pointer) = contact.avatar.as_ref().and_then(|a| a.avatar.as_ref()) {
                if let Err(e) = self.handle_attachment(pointer).await {
                    warn!("failed to fetch contact avatar: {e}");
                }
            }
        }

        Ok((message, attachments))
    }

    async fn reconcile_group(
        self: &Arc<Self>,
        envelope: &Envelope,
        message: &mut DataMessage,
    ) -> Result<(), EngineError> {
        let source = envelope.source().to_string();
        let Some(mut group) = message.group.take() else {
            return Ok(());
        };
        let id = group
            .id
            .clone()
            .ok_or_else(|| EngineError::validation("group id missing"))?;
        let group_type = group.group_type();

        if matches!(
            group_type,
            group_context::Type::Unknown | group_context::Type::RequestInfo
        ) {
            self.cache.remove(envelope).await?;
            return Err(EngineError::validation("unknown group message type"));
        }

        if group_type == group_context::Type::Update {
            if let Some(avatar) = group.avatar.clone() {
                self.handle_attachment(&avatar).await?;
            }
        }

        let existing = self.store.group_numbers(&id).await?;
        match existing {
            None => {
                if group_type != group_context::Type::Update {
                    warn!("got message for unknown group");
                    group.members = vec![source.clone()];
                }
                self.store.group_create(&id, group.members.clone()).await?;
            }
            Some(_) => match group_type {
                group_context::Type::Update => {
                    self.store
                        .group_update_numbers(&id, group.members.clone())
                        .await?;
                }
                group_context::Type::Quit => {
                    if source == self.creds.number {
                        debug!("leaving group");
                        self.store.group_delete(&id).await?;
                    } else {
                        self.store.group_remove_number(&id, &source).await?;
                    }
                }
                _ => {}
            },
        }

        match group_type {
            group_context::Type::Deliver => {
                // The id stays as a routing tag; everything else is stale.
                group.name = None;
                group.members.clear();
                group.avatar = None;
            }
            group_context::Type::Quit => {
                message.body = None;
                message.attachments.clear();
            }
            _ => {}
        }
        message.group = Some(group);
        Ok(())
    }

    pub(crate) async fn handle_attachment(
        &self,
        pointer: &AttachmentPointer,
    ) -> Result<RetrievedAttachment, EngineError> {
        let id = pointer
            .id
            .ok_or_else(|| EngineError::validation("attachment without id"))?;
        let encrypted = self
            .server
            .get_attachment(id)
            .await
            .map_err(|e| EngineError::transport(format!("attachment fetch failed: {e}")))?;
        let key = pointer.key.clone().unwrap_or_default();
        let data = self.crypto.decrypt_attachment(&key, &encrypted).await?;
        Ok(RetrievedAttachment {
            pointer: pointer.clone(),
            data,
        })
    }
}
