// tandem - a SIP client transaction engine
// Copyright (C) 2026 Tandem Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::time::Duration;

use bytes::Bytes;
use proptest::prelude::*;
use tandem_msg::{Headers, Method, Request, RequestLine};
use tandem_transaction::{
    ack_for_failure, branch_from_via, generate_branch_id, header_param, ClientAction,
    ClientEvent, NonInviteClientFsm, TimerConfig, TimerTable, TransactionTimer, TransportKind,
};

fn is_rfc3261_branch(branch: &str) -> bool {
    branch.starts_with("z9hG4bK")
}

proptest! {
    #[test]
    fn generated_branch_has_magic_cookie(_iteration in 0..100) {
        let branch = generate_branch_id();
        prop_assert!(is_rfc3261_branch(&branch), "branch: {}", branch);
        prop_assert!(branch.len() > "z9hG4bK".len());
    }

    #[test]
    fn generated_branches_are_unique(_iteration in 0..50) {
        prop_assert_ne!(generate_branch_id(), generate_branch_id());
    }

    #[test]
    fn branch_extraction_from_via(
        host in "[a-z]{3,10}",
        suffix in "[a-zA-Z0-9]{8,16}",
    ) {
        let branch = format!("z9hG4bK{}", suffix);
        let via = format!("SIP/2.0/UDP {};branch={}", host, branch);
        prop_assert_eq!(branch_from_via(&via), Some(branch.as_str()));
    }

    #[test]
    fn params_in_the_leading_segment_are_not_parameters(
        host in "[a-z]{3,10}",
        suffix in "[a-zA-Z0-9]{4,12}",
    ) {
        // A `branch=` outside the parameter list must not match.
        let via = format!("SIP/2.0/UDP branch={}.{}", suffix, host);
        prop_assert_eq!(header_param(&via, "branch"), None);
    }

    #[test]
    fn ack_preserves_the_cseq_sequence(sequence in 1u32..=u32::MAX) {
        let cseq = format!("{} INVITE", sequence);
        let invite = Request::new(
            RequestLine::new(Method::Invite, "sip:bob@example.com"),
            Headers::new()
                .with("Via", "SIP/2.0/UDP host;branch=z9hG4bKabc")
                .with("To", "<sip:bob@example.com>")
                .with("CSeq", &cseq),
            Bytes::new(),
        );
        let response = tandem_msg::Response::new(
            tandem_msg::StatusLine::new(486, "Busy Here").unwrap(),
            Headers::new().with("To", "<sip:bob@example.com>;tag=x"),
            Bytes::new(),
        );

        let ack = ack_for_failure(&invite, &response);
        let expected = format!("{} ACK", sequence);
        prop_assert_eq!(ack.headers().get("CSeq").unwrap().as_str(), expected.as_str());
    }

    /// Successive Timer E intervals obey `e(i+1) = min(2·e(i), T2)`.
    #[test]
    fn non_invite_backoff_is_bounded(fires in 1usize..12) {
        let table = TimerTable::new(TimerConfig::default(), TransportKind::Udp);
        let mut fsm = NonInviteClientFsm::new(table);

        let request = Request::new(
            RequestLine::new(Method::Register, "sip:registrar.example.com"),
            Headers::new().with("Via", "SIP/2.0/UDP host;branch=z9hG4bKreg"),
            Bytes::new(),
        );
        let mut intervals = vec![Duration::from_millis(500)];
        fsm.on_event(ClientEvent::Send(request));

        for _ in 0..fires {
            let actions = fsm.on_event(ClientEvent::TimerFired(TransactionTimer::E));
            let next = actions.iter().find_map(|a| match a {
                ClientAction::Schedule { timer: TransactionTimer::E, duration } => Some(*duration),
                _ => None,
            });
            intervals.push(next.expect("Timer E rescheduled"));
        }

        let t2 = Duration::from_secs(4);
        for pair in intervals.windows(2) {
            prop_assert_eq!(pair[1], (pair[0] * 2).min(t2));
        }
    }
}
