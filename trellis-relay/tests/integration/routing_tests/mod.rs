mod test_offer_routed_verbatim;
