use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::debug;
use serde_json::json;
use std::sync::Arc;

use courier_proto::service::verified;
use courier_proto::{
    data_message, sync_message, ContactDetails, Envelope, GroupDetails, ProtoStreamReader,
    SyncMessage, Verified,
};

use crate::error::EngineError;
use crate::events::{
    ConfigurationEvent, ContactEvent, Event, GroupEvent, ReadSyncEvent, SentEvent, VerifiedEvent,
};
use crate::receiver::ReceiverInner;

impl ReceiverInner {
    pub(crate) async fn handle_sync_message(
        self: &Arc<Self>,
        envelope: &Envelope,
        sync: SyncMessage,
    ) -> Result<(), EngineError> {
        // Sync messages only travel between our own devices.
        if envelope.source() != self.creds.number {
            return Err(EngineError::validation("sync message from another number"));
        }
        if envelope.source_device() == self.creds.device_id {
            return Err(EngineError::validation("sync message from our own device"));
        }
        if let Some(sent) = sync.sent {
            self.handle_sent_message(envelope, sent).await
        } else if let Some(contacts) = sync.contacts {
            self.handle_contacts(envelope, contacts).await
        } else if let Some(groups) = sync.groups {
            self.handle_groups(envelope, groups).await
        } else if let Some(blocked) = sync.blocked {
            self.handle_blocked(envelope, blocked).await
        } else if sync.request.is_some() {
            debug!("got sync request message");
            self.cache.remove(envelope).await
        } else if !sync.read.is_empty() {
            self.handle_read(envelope, &sync.read);
            Ok(())
        } else if let Some(verified) = sync.verified {
            self.handle_verified(envelope, verified)
        } else if let Some(configuration) = sync.configuration {
            self.handle_configuration(envelope, configuration)
        } else {
            Err(EngineError::validation("got empty sync message"))
        }
    }

    async fn handle_sent_message(
        self: &Arc<Self>,
        envelope: &Envelope,
        sent: sync_message::Sent,
    ) -> Result<(), EngineError> {
        let message = sent
            .message
            .ok_or_else(|| EngineError::validation("sent sync without message"))?;
        if message.flags() & data_message::FLAG_END_SESSION != 0 {
            if let Some(destination) = sent.destination.as_deref() {
                self.handle_end_session(destination).await?;
            }
        }
        let (message, attachments) = self.process_decrypted(envelope, message).await?;
        self.events.publish(Event::Sent(SentEvent {
            destination: sent.destination,
            timestamp: sent.timestamp.unwrap_or_default(),
            expiration_start_timestamp: sent.expiration_start_timestamp,
            device: envelope.source_device(),
            message,
            attachments,
            confirm: self.cache.confirm_handle(envelope),
        }));
        Ok(())
    }

    async fn handle_contacts(
        self: &Arc<Self>,
        envelope: &Envelope,
        contacts: sync_message::Contacts,
    ) -> Result<(), EngineError> {
        let blob = contacts
            .blob
            .ok_or_else(|| EngineError::validation("contact sync without blob"))?;
        let retrieved = self.handle_attachment(&blob).await?;
        let mut reader = ProtoStreamReader::new(&retrieved.data);
        while let Some(contact) = reader
            .next::<ContactDetails>()
            .map_err(|e| EngineError::validation(format!("contact blob: {e}")))?
        {
            self.events.publish(Event::Contact(ContactEvent {
                contact,
                avatar: None,
                confirm: self.cache.confirm_handle(envelope),
            }));
        }
        self.events
            .publish(Event::ContactSync(self.cache.confirm_handle(envelope)));
        Ok(())
    }

    async fn handle_groups(
        self: &Arc<Self>,
        envelope: &Envelope,
        groups: sync_message::Groups,
    ) -> Result<(), EngineError> {
        let blob = groups
            .blob
            .ok_or_else(|| EngineError::validation("group sync without blob"))?;
        let retrieved = self.handle_attachment(&blob).await?;
        let mut reader = ProtoStreamReader::new(&retrieved.data);
        while let Some(group) = reader
            .next::<GroupDetails>()
            .map_err(|e| EngineError::validation(format!("group blob: {e}")))?
        {
            if let Some(id) = group.id.clone() {
                self.store
                    .group_update_numbers(&id, group.members.clone())
                    .await?;
            }
            self.events.publish(Event::Group(GroupEvent {
                group,
                confirm: self.cache.confirm_handle(envelope),
            }));
        }
        self.events
            .publish(Event::GroupSync(self.cache.confirm_handle(envelope)));
        Ok(())
    }

    async fn handle_blocked(
        self: &Arc<Self>,
        envelope: &Envelope,
        blocked: sync_message::Blocked,
    ) -> Result<(), EngineError> {
        debug!("applying blocked sync with {} numbers", blocked.numbers.len());
        self.store
            .put_pref("blocked", json!(blocked.numbers))
            .await?;
        let group_ids: Vec<String> = blocked
            .group_ids
            .iter()
            .map(|id| STANDARD.encode(id))
            .collect();
        self.store
            .put_pref("blocked-groups", json!(group_ids))
            .await?;
        self.cache.remove(envelope).await
    }

    fn handle_read(self: &Arc<Self>, envelope: &Envelope, reads: &[sync_message::Read]) {
        for read in reads {
            self.events.publish(Event::ReadSync(ReadSyncEvent {
                timestamp: read.timestamp.unwrap_or_default(),
                sender: read.sender.clone().unwrap_or_default(),
                read_at: envelope.timestamp(),
                confirm: self.cache.confirm_handle(envelope),
            }));
        }
    }

    fn handle_verified(
        self: &Arc<Self>,
        envelope: &Envelope,
        message: Verified,
    ) -> Result<(), EngineError> {
        let state = message
            .state
            .and_then(|raw| verified::State::try_from(raw).ok())
            .unwrap_or(verified::State::Default);
        self.events.publish(Event::Verified(VerifiedEvent {
            destination: message.destination.unwrap_or_default(),
            identity_key: message.identity_key.unwrap_or_default(),
            state,
            confirm: self.cache.confirm_handle(envelope),
        }));
        Ok(())
    }

    fn handle_configuration(
        self: &Arc<Self>,
        envelope: &Envelope,
        configuration: sync_message::Configuration,
    ) -> Result<(), EngineError> {
        self.events.publish(Event::Configuration(ConfigurationEvent {
            read_receipts: configuration.read_receipts.unwrap_or_default(),
            confirm: self.cache.confirm_handle(envelope),
        }));
        Ok(())
    }
}
