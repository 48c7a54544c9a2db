use crate::dns::DNSPacket;
use crate::dns::constants::AUTHORITY_TTL;
use crate::dns::question::DNSQuestion;
use crate::dns::resource::DNSResource;
use crate::records::RecordStore;
use crate::resolver::Recursor;
use std::sync::Arc;
use tracing::debug;

/// Answers queries for the owned zone from the record store, recursing for
/// whatever the store does not hold.
#[derive(Debug)]
pub struct Authority {
    /// Lower-case FQDN of the owned zone
    zone: String,
    /// Target of the authority NS record, without trailing dot
    host: String,
    store: Arc<RecordStore>,
    recursor: Arc<Recursor>,
}

impl Authority {
    pub fn new(
        zone: impl Into<String>,
        host: impl Into<String>,
        store: Arc<RecordStore>,
        recursor: Arc<Recursor>,
    ) -> Self {
        Self {
            zone: zone.into(),
            host: host.into(),
            store,
            recursor,
        }
    }

    /// Whether `name` is the zone apex or below it.
    pub fn is_authoritative_for(&self, name: &str) -> bool {
        if self.zone == "." {
            return true;
        }
        let name = name.to_lowercase();
        name == self.zone || name.ends_with(&format!(".{}", self.zone))
    }

    /// Zone-relative table key for a queried name. Names outside the zone,
    /// and the apex itself, map to themselves and therefore never match.
    fn record_key(&self, name: &str) -> String {
        let name = name.to_lowercase();
        match name.strip_suffix(&format!(".{}", self.zone)) {
            Some(key) => key.to_string(),
            None => name,
        }
    }

    /// Splits questions into synthesized answers from the store and the
    /// questions left unresolved.
    pub fn split(&self, questions: &[DNSQuestion]) -> (Vec<DNSResource>, Vec<DNSQuestion>) {
        let mut answers = Vec::new();
        let mut unknown = Vec::new();

        for question in questions {
            let name = question.name();
            match self.store.get(&self.record_key(&name)) {
                Some(record) => answers.push(DNSResource::a(&name, record.ttl, record.address)),
                None => unknown.push(question.clone()),
            }
        }

        (answers, unknown)
    }

    /// The authority record naming this server.
    pub fn authority_record(&self) -> DNSResource {
        DNSResource::ns(&self.zone, AUTHORITY_TTL, &format!("{}.", self.host))
    }

    /// Builds the authoritative reply for `request`. Questions that neither
    /// the store nor any upstream could answer are left out of the answer
    /// section; the reply stays NOERROR.
    pub async fn answer(&self, request: &DNSPacket) -> DNSPacket {
        let (mut answers, unknown) = self.split(&request.questions);

        if !unknown.is_empty() {
            debug!(
                "Failed to resolve {:?}, recursing",
                unknown.iter().map(DNSQuestion::name).collect::<Vec<_>>()
            );
            answers.extend(self.recursor.resolve(&unknown).await);
        }

        let mut message = DNSPacket::reply_to(request);
        message.answers = answers;
        message.authorities = vec![self.authority_record()];
        message.header.aa = true;
        message.header.ra = true;
        message
    }
}
