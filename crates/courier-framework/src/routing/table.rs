use std::cmp::Reverse;
use std::fmt;

use futures::future::join_all;
use tracing::{debug, warn};

use super::RouterRegistration;
use crate::error::{FrameworkError, FrameworkResult};
use courier_core::{BROADCAST_URL, DispatchError, DispatchResult, Endpoint, Envelope, RouterError};

/// The immutable set of routers, in preference order.
///
/// Non-fallback routers come first by descending priority, then fallback
/// routers by descending priority. Ties keep registration order.
pub struct RouterTable {
    routers: Vec<RouterRegistration>,
}

impl RouterTable {
    /// Builds the table from registrations in registration order.
    pub fn new(mut registrations: Vec<RouterRegistration>) -> Self {
        registrations.sort_by_key(|r| (r.is_fallback, Reverse(r.priority)));
        Self {
            routers: registrations,
        }
    }

    /// Creates a table without routers. Every dispatch fails with a routing error.
    pub fn empty() -> Self {
        Self {
            routers: Vec::new(),
        }
    }

    /// Returns the registrations in preference order.
    pub fn registrations(&self) -> &[RouterRegistration] {
        &self.routers
    }

    /// Returns the number of routers.
    pub fn len(&self) -> usize {
        self.routers.len()
    }

    /// Returns `true` if no router is registered.
    pub fn is_empty(&self) -> bool {
        self.routers.is_empty()
    }

    /// Reports non-fallback routers that share a pattern and a priority.
    ///
    /// Such routers compete for the same recipients and only registration
    /// order decides between them. In strict mode this is an error,
    /// otherwise each pair is logged as a warning.
    pub fn validate(&self, strict: bool) -> FrameworkResult<()> {
        let primary: Vec<&RouterRegistration> =
            self.routers.iter().filter(|r| !r.is_fallback).collect();

        for (i, first) in primary.iter().enumerate() {
            for second in &primary[i + 1..] {
                if first.priority != second.priority
                    || first.receiver_pattern.as_str() != second.receiver_pattern.as_str()
                {
                    continue;
                }

                let err = FrameworkError::AmbiguousRouters {
                    first: first.name().to_owned(),
                    second: second.name().to_owned(),
                    pattern: first.receiver_pattern.as_str().to_owned(),
                    priority: first.priority.0,
                };
                if strict {
                    return Err(err);
                }
                warn!("{err}");
            }
        }

        Ok(())
    }

    /// Returns the indices of the routers whose pattern matches `url`, in
    /// preference order.
    fn candidates(&self, url: &str) -> Vec<usize> {
        self.routers
            .iter()
            .enumerate()
            .filter(|(_, registration)| registration.matches(url))
            .map(|(index, _)| index)
            .collect()
    }

    /// Returns the names of the routers that would be tried for `endpoint`.
    pub fn candidate_names(&self, endpoint: &Endpoint) -> Vec<&str> {
        self.candidates(&endpoint.routing_url())
            .into_iter()
            .map(|index| self.routers[index].name())
            .collect()
    }

    /// Hands `envelope` to the first accepting router of each recipient.
    ///
    /// Recipients with different candidate lists are sent as separate
    /// branches, each carrying only its recipients. When a router declines a
    /// branch of several recipients, the branch splits into one branch per
    /// recipient and each resumes selection at that router. An envelope
    /// without recipients is routed as a broadcast to [`BROADCAST_URL`].
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Transport`] if an accepting router's transport failed
    /// - [`DispatchError::Routing`] naming the recipients no router accepted
    pub async fn dispatch(&self, envelope: &Envelope) -> DispatchResult<()> {
        if envelope.recipients.is_empty() {
            let candidates = self.candidates(BROADCAST_URL);
            return self.send_branch(&candidates, envelope).await;
        }

        let mut branches: Vec<(Vec<usize>, Vec<Endpoint>)> = Vec::new();
        for recipient in &envelope.recipients {
            let candidates = self.candidates(&recipient.routing_url());
            match branches.iter_mut().find(|(c, _)| *c == candidates) {
                Some((_, recipients)) => recipients.push(recipient.clone()),
                None => branches.push((candidates, vec![recipient.clone()])),
            }
        }

        if let [(candidates, _)] = branches.as_slice() {
            return self.send_branch(candidates, envelope).await;
        }

        debug!(branches = branches.len(), "Fanning out envelope");
        let results = join_all(branches.iter().map(|(candidates, recipients)| async move {
            let branch = envelope.with_recipients(recipients.clone());
            self.send_branch(candidates, &branch).await
        }))
        .await;
        merge_outcomes(results)
    }

    async fn send_branch(&self, candidates: &[usize], envelope: &Envelope) -> DispatchResult<()> {
        match self.select(candidates, envelope).await? {
            Selection::Accepted => Ok(()),
            Selection::Declined { at } if envelope.recipients.len() > 1 => {
                let remaining = &candidates[at..];
                debug!(
                    id = %envelope.id,
                    recipients = envelope.recipients.len(),
                    "Splitting declined branch per recipient"
                );
                let results = join_all(envelope.recipients.iter().map(|recipient| async move {
                    let single = envelope.with_recipients(vec![recipient.clone()]);
                    match self.select(remaining, &single).await {
                        Ok(Selection::Accepted) => Ok(()),
                        Ok(Selection::Declined { .. }) => Err(unresolved(&single, remaining.len())),
                        Err(err) => Err(err),
                    }
                }))
                .await;
                merge_outcomes(results)
            }
            Selection::Declined { .. } => Err(unresolved(envelope, candidates.len())),
        }
    }

    /// Offers `envelope` to `candidates` in order.
    ///
    /// A branch of several recipients stops at the first decline, reporting
    /// its position.
    async fn select(&self, candidates: &[usize], envelope: &Envelope) -> DispatchResult<Selection> {
        for (position, &index) in candidates.iter().enumerate() {
            let registration = &self.routers[index];

            match registration.router.try_send(envelope).await {
                Ok(()) => {
                    debug!(
                        router = registration.name(),
                        id = %envelope.id,
                        "Router accepted envelope"
                    );
                    return Ok(Selection::Accepted);
                }
                Err(RouterError::Transport(err)) => {
                    warn!(
                        router = registration.name(),
                        id = %envelope.id,
                        error = %err,
                        "Transport failed after router accepted envelope"
                    );
                    return Err(DispatchError::Transport(err));
                }
                Err(declined) => {
                    debug!(
                        router = registration.name(),
                        reason = %declined,
                        "Router declined envelope"
                    );
                    if envelope.recipients.len() > 1 {
                        return Ok(Selection::Declined { at: position });
                    }
                }
            }
        }
        Ok(Selection::Declined {
            at: candidates.len(),
        })
    }
}

enum Selection {
    Accepted,
    Declined { at: usize },
}

/// Folds branch outcomes. A transport error wins over routing errors, whose
/// endpoints are merged.
fn merge_outcomes(results: Vec<DispatchResult<()>>) -> DispatchResult<()> {
    let mut unresolved = Vec::new();
    for result in results {
        match result {
            Ok(()) => {}
            Err(DispatchError::Routing { endpoints }) => unresolved.extend(endpoints),
            Err(other) => return Err(other),
        }
    }

    if unresolved.is_empty() {
        Ok(())
    } else {
        Err(DispatchError::Routing {
            endpoints: unresolved,
        })
    }
}

fn unresolved(envelope: &Envelope, candidates: usize) -> DispatchError {
    let endpoints = unresolved_urls(envelope);
    warn!(
        id = %envelope.id,
        endpoints = ?endpoints,
        candidates,
        "No router accepted envelope"
    );
    DispatchError::Routing { endpoints }
}

fn unresolved_urls(envelope: &Envelope) -> Vec<String> {
    if envelope.recipients.is_empty() {
        vec![BROADCAST_URL.to_owned()]
    } else {
        envelope
            .recipients
            .iter()
            .map(|recipient| recipient.routing_url().into_owned())
            .collect()
    }
}

impl fmt::Debug for RouterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterTable")
            .field("routers", &self.routers)
            .finish()
    }
}
